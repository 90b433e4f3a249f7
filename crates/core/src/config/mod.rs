use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{storage::write_json_atomic, LedSuitError, Result, SecondaryColor};

/// Suit count used whenever the app config is missing or unreadable.
pub const DEFAULT_SUIT_COUNT: usize = 8;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub num_suits: usize,
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            num_suits: DEFAULT_SUIT_COUNT,
            spectrogram: SpectrogramConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `appconfig.json`. Nothing in here is fatal: an unreadable file,
    /// a non-object document or a bad field falls back to the defaults and
    /// logs a warning.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to open app config file");
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Self::from_object(&map),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "invalid app config file format");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "app config is not valid JSON");
                Self::default()
            }
        }
    }

    fn from_object(map: &serde_json::Map<String, Value>) -> Self {
        let num_suits = match map.get("numSuits").and_then(Value::as_f64) {
            Some(n) if n >= 1.0 && n.fract() == 0.0 => n as usize,
            _ => {
                tracing::warn!(
                    default = DEFAULT_SUIT_COUNT,
                    "numSuits missing or invalid, using default suit count"
                );
                DEFAULT_SUIT_COUNT
            }
        };

        Self {
            num_suits,
            spectrogram: section(map, "spectrogram"),
            network: section(map, "network"),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

fn section<T>(map: &serde_json::Map<String, Value>, key: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match map.get(key) {
        None => T::default(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            tracing::warn!(section = key, %err, "invalid config section, using defaults");
            T::default()
        }),
    }
}

/// Parameters of the short-time FFT analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpectrogramConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_size: usize,
    pub max_frequency: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 1024,
            hop_size: 512,
            max_frequency: 1000.0,
        }
    }
}

/// Endpoints and timeouts used by the distribution client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub suit_port: u16,
    pub broadcast_address: String,
    pub broadcast_port: u16,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub sync_payload: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            suit_port: 12345,
            broadcast_address: "192.168.105.255".to_string(),
            broadcast_port: 12346,
            connect_timeout_ms: 3000,
            write_timeout_ms: 3000,
            sync_payload: "GO".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Locations of the JSON documents inside a config directory.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn app_config(&self) -> PathBuf {
        self.dir.join("appconfig.json")
    }

    pub fn suits(&self) -> PathBuf {
        self.dir.join("suits.json")
    }

    pub fn presets(&self) -> PathBuf {
        self.dir.join("presets.json")
    }
}

/// Creates the config directory and writes default documents for any that
/// are missing. Existing files are never touched.
pub fn ensure_config_files(paths: &ConfigPaths) -> Result<()> {
    fs::create_dir_all(paths.dir())?;

    let app_config = paths.app_config();
    if !app_config.exists() {
        AppConfig::default().save(&app_config)?;
        tracing::info!(path = %app_config.display(), "created default app config");
    }

    let suits = paths.suits();
    if !suits.exists() {
        SuitRegistry::with_defaults(DEFAULT_SUIT_COUNT).save(&suits)?;
        tracing::info!(path = %suits.display(), "created default suit config");
    }

    Ok(())
}

/// Network endpoint of one suit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitConnection {
    pub name: String,
    pub address: String,
    pub port: u16,
}

impl SuitConnection {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// One entry of `suits.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuitProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub color: SecondaryColorFlags,
}

impl SuitProfile {
    pub fn secondary(&self) -> SecondaryColor {
        if self.color.green {
            SecondaryColor::Green
        } else {
            SecondaryColor::Red
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryColorFlags {
    #[serde(default)]
    pub red: bool,
    #[serde(default)]
    pub green: bool,
}

impl Default for SecondaryColorFlags {
    fn default() -> Self {
        Self {
            red: true,
            green: false,
        }
    }
}

impl From<SecondaryColor> for SecondaryColorFlags {
    fn from(value: SecondaryColor) -> Self {
        Self {
            red: value == SecondaryColor::Red,
            green: value == SecondaryColor::Green,
        }
    }
}

/// Names, wiring colors and endpoints of every configured suit, in suit
/// order. Owned by the application context and lent to whoever needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuitRegistry {
    profiles: Vec<SuitProfile>,
    port: u16,
}

impl SuitRegistry {
    pub fn new(profiles: Vec<SuitProfile>, port: u16) -> Self {
        Self { profiles, port }
    }

    /// Placeholder profiles written by [`ensure_config_files`].
    pub fn with_defaults(count: usize) -> Self {
        let profiles = (0..count)
            .map(|i| SuitProfile {
                name: format!("Suit {}", i + 1),
                ip: String::new(),
                color: SecondaryColorFlags::default(),
            })
            .collect();
        Self::new(profiles, NetworkConfig::default().suit_port)
    }

    /// Loads `suits.json`. Array entries that cannot be read are skipped; a
    /// suit without an IP keeps its profile but gets no connection.
    pub fn load(path: &Path, port: u16) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)?;
        let Value::Array(entries) = document else {
            return Err(LedSuitError::invalid(format!(
                "suit config {} is not a JSON array",
                path.display()
            )));
        };

        let mut profiles = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<SuitProfile>(entry) {
                Ok(profile) => {
                    if profile.ip.trim().is_empty() {
                        tracing::warn!(index, name = %profile.name, "missing IP for suit");
                    }
                    profiles.push(profile);
                }
                Err(err) => tracing::warn!(index, %err, "skipping malformed suit entry"),
            }
        }

        Ok(Self::new(profiles, port))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.profiles)
    }

    pub fn profiles(&self) -> &[SuitProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn name(&self, suit: usize) -> Option<&str> {
        self.profiles.get(suit).map(|profile| profile.name.as_str())
    }

    pub fn secondary(&self, suit: usize) -> SecondaryColor {
        self.profiles
            .get(suit)
            .map(SuitProfile::secondary)
            .unwrap_or_default()
    }

    /// Endpoints of every suit that has an address, in suit order.
    pub fn connections(&self) -> Vec<SuitConnection> {
        self.profiles
            .iter()
            .filter(|profile| !profile.ip.trim().is_empty())
            .map(|profile| SuitConnection {
                name: profile.name.clone(),
                address: profile.ip.trim().to_string(),
                port: self.port,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_app_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config.num_suits, DEFAULT_SUIT_COUNT);
        assert_eq!(config.spectrogram.fft_size, 1024);
    }

    #[test]
    fn invalid_suit_count_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appconfig.json");
        fs::write(&path, r#"{"numSuits": "four", "network": {"suitPort": 4000}}"#).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.num_suits, DEFAULT_SUIT_COUNT);
        assert_eq!(config.network.suit_port, 4000);
        assert_eq!(config.network.broadcast_port, 12346);
    }

    #[test]
    fn reads_suit_count_and_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appconfig.json");
        fs::write(&path, r#"{"numSuits": 3, "spectrogram": {"fftSize": 2048}}"#).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.num_suits, 3);
        assert_eq!(config.spectrogram.fft_size, 2048);
        assert_eq!(config.spectrogram.hop_size, 512);
    }

    #[test]
    fn suit_registry_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suits.json");
        fs::write(
            &path,
            r#"[
                {"name": "Alpha", "ip": "10.0.0.2", "color": {"red": false, "green": true}},
                42,
                {"name": "Bravo", "ip": ""},
                {"name": "Charlie", "ip": "10.0.0.4"}
            ]"#,
        )
        .unwrap();

        let registry = SuitRegistry::load(&path, 12345).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.secondary(0), SecondaryColor::Green);
        assert_eq!(registry.secondary(2), SecondaryColor::Red);

        let connections = registry.connections();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[1].endpoint(), "10.0.0.4:12345");
        assert_eq!(connections[0].name, "Alpha");
    }

    #[test]
    fn ensure_config_files_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(dir.path().join("config"));

        ensure_config_files(&paths).unwrap();
        let registry = SuitRegistry::load(&paths.suits(), 12345).unwrap();
        assert_eq!(registry.len(), DEFAULT_SUIT_COUNT);
        assert_eq!(registry.name(0), Some("Suit 1"));
        assert!(registry.connections().is_empty());

        fs::write(paths.app_config(), r#"{"numSuits": 2}"#).unwrap();
        ensure_config_files(&paths).unwrap();
        assert_eq!(AppConfig::load(&paths.app_config()).num_suits, 2);
    }
}
