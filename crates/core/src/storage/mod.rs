use std::{ffi::OsString, fs, path::Path};

use serde::Serialize;
use serde_json::Value;

use crate::{LedSuitError, PartColor, Result, SuitPart, SuitState, Waypoint};

/// Serializes `value` as pretty JSON and replaces `path` in one step: the
/// document goes to a sibling temporary file which is then renamed over the
/// target, so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp_name = path
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| LedSuitError::invalid(format!("{} is not a file path", path.display())))?;
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(err) = fs::write(&tmp_path, &bytes).and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote JSON document");
    Ok(())
}

/// Writes the waypoint export format.
pub fn save_waypoints(path: &Path, waypoints: &[Waypoint]) -> Result<()> {
    write_json_atomic(path, waypoints)?;
    tracing::info!(path = %path.display(), count = waypoints.len(), "exported waypoints");
    Ok(())
}

/// Reads a waypoint export. The document must be an array; entries inside it
/// that cannot be read are skipped with a warning.
pub fn load_waypoints(path: &Path) -> Result<Vec<Waypoint>> {
    let text = fs::read_to_string(path)?;
    parse_waypoints(&text)
}

/// Parses the waypoint export format. The document must be an array and
/// entries that are not objects are skipped. Inside an entry every scalar is
/// read leniently: a missing, mistyped or out-of-range value becomes 0 and
/// the waypoint is kept.
pub fn parse_waypoints(text: &str) -> Result<Vec<Waypoint>> {
    let Value::Array(entries) = serde_json::from_str(text)? else {
        return Err(LedSuitError::invalid(
            "invalid waypoint document, expected an array of waypoints",
        ));
    };

    let mut waypoints = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Value::Object(map) = entry else {
            tracing::warn!(index, "skipping waypoint entry that is not an object");
            continue;
        };

        let time = match map.get("timeInSeconds") {
            Some(value) => value.as_f64().unwrap_or_else(|| {
                tracing::warn!(index, %value, "waypoint time is not a number, using 0");
                0.0
            }),
            None => 0.0,
        };
        let states = match map.get("suitStates") {
            Some(Value::Array(states)) => states.iter().map(suit_state_from_value).collect(),
            _ => Vec::new(),
        };
        waypoints.push(Waypoint::new(time, states));
    }

    Ok(waypoints)
}

/// Color channel of a JSON document. Anything but a number in `0..=255`
/// reads as 0.
fn channel(value: Option<&Value>) -> u8 {
    match value.and_then(Value::as_f64) {
        Some(v) if (0.0..=255.0).contains(&v) => v as u8,
        _ => 0,
    }
}

fn suit_state_from_value(value: &Value) -> SuitState {
    let mut state = SuitState::default();
    for part in SuitPart::ALL {
        let color = value.get(part.key());
        state.set_part(
            part,
            PartColor::rgb(
                channel(color.and_then(|c| c.get("r"))),
                channel(color.and_then(|c| c.get("g"))),
                channel(color.and_then(|c| c.get("b"))),
            ),
        );
    }
    state
}

/// Reads one suit of the flat preset layout (`head_r`, `bodyPrimary_g`, ...).
fn preset_state_from_value(value: &Value) -> SuitState {
    let mut state = SuitState::default();
    for part in SuitPart::ALL {
        let key = part.key();
        state.set_part(
            part,
            PartColor::rgb(
                channel(value.get(format!("{key}_r"))),
                channel(value.get(format!("{key}_g"))),
                channel(value.get(format!("{key}_b"))),
            ),
        );
    }
    state
}

/// Flat per-suit layout written to the preset file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct PresetSuit {
    head_r: u8,
    head_g: u8,
    head_b: u8,
    #[serde(rename = "bodyPrimary_r")]
    body_primary_r: u8,
    #[serde(rename = "bodyPrimary_g")]
    body_primary_g: u8,
    #[serde(rename = "bodyPrimary_b")]
    body_primary_b: u8,
    #[serde(rename = "bodySecondary_r")]
    body_secondary_r: u8,
    #[serde(rename = "bodySecondary_g")]
    body_secondary_g: u8,
    #[serde(rename = "bodySecondary_b")]
    body_secondary_b: u8,
    #[serde(rename = "legPrimary_r")]
    leg_primary_r: u8,
    #[serde(rename = "legPrimary_g")]
    leg_primary_g: u8,
    #[serde(rename = "legPrimary_b")]
    leg_primary_b: u8,
    #[serde(rename = "legSecondary_r")]
    leg_secondary_r: u8,
    #[serde(rename = "legSecondary_g")]
    leg_secondary_g: u8,
    #[serde(rename = "legSecondary_b")]
    leg_secondary_b: u8,
    reserve_r: u8,
    reserve_g: u8,
    reserve_b: u8,
}

impl From<&SuitState> for PresetSuit {
    fn from(state: &SuitState) -> Self {
        Self {
            head_r: state.head.r,
            head_g: state.head.g,
            head_b: state.head.b,
            body_primary_r: state.body_primary.r,
            body_primary_g: state.body_primary.g,
            body_primary_b: state.body_primary.b,
            body_secondary_r: state.body_secondary.r,
            body_secondary_g: state.body_secondary.g,
            body_secondary_b: state.body_secondary.b,
            leg_primary_r: state.leg_primary.r,
            leg_primary_g: state.leg_primary.g,
            leg_primary_b: state.leg_primary.b,
            leg_secondary_r: state.leg_secondary.r,
            leg_secondary_g: state.leg_secondary.g,
            leg_secondary_b: state.leg_secondary.b,
            reserve_r: state.reserve.r,
            reserve_g: state.reserve.g,
            reserve_b: state.reserve.b,
        }
    }
}

#[derive(Debug, Serialize)]
struct PresetRecord {
    name: String,
    suits: Vec<PresetSuit>,
}

/// Named snapshot of every suit.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub suit_states: Vec<SuitState>,
}

impl Preset {
    pub fn new(name: impl Into<String>, suit_states: Vec<SuitState>) -> Self {
        Self {
            name: name.into(),
            suit_states,
        }
    }
}

#[derive(Debug, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl PresetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.name == name)
    }

    pub fn add(&mut self, preset: Preset) {
        tracing::info!(name = %preset.name, "added preset");
        self.presets.push(preset);
    }

    /// Removes every preset called `name`.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.presets.len();
        self.presets.retain(|preset| preset.name != name);
        if self.presets.len() == before {
            return Err(LedSuitError::msg(format!("preset not found: {name}")));
        }
        tracing::info!(name, "removed preset");
        Ok(())
    }

    pub fn edit(&mut self, name: &str, replacement: Preset) -> Result<()> {
        let slot = self
            .presets
            .iter_mut()
            .find(|preset| preset.name == name)
            .ok_or_else(|| LedSuitError::msg(format!("preset not found: {name}")))?;
        *slot = replacement;
        Ok(())
    }

    /// Loads a preset file, keeping only presets with exactly `suit_count`
    /// suits. A missing file yields an empty library.
    pub fn load(path: &Path, suit_count: usize) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "preset file not found");
                return Ok(Self::new());
            }
            Err(err) => return Err(err.into()),
        };

        let Value::Array(entries) = serde_json::from_str(&text)? else {
            return Err(LedSuitError::invalid("preset file is not a JSON array"));
        };

        let mut library = Self::new();
        for (index, entry) in entries.iter().enumerate() {
            let (Some(name), Some(Value::Array(suits))) = (
                entry.get("name").and_then(Value::as_str),
                entry.get("suits"),
            ) else {
                tracing::warn!(index, "skipping malformed preset");
                continue;
            };

            if suits.len() != suit_count {
                tracing::warn!(
                    name,
                    suits = suits.len(),
                    expected = suit_count,
                    "invalid number of suits in preset"
                );
                continue;
            }

            let states = suits.iter().map(preset_state_from_value).collect();
            library.presets.push(Preset::new(name, states));
        }

        Ok(library)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let records: Vec<PresetRecord> = self
            .presets
            .iter()
            .map(|preset| PresetRecord {
                name: preset.name.clone(),
                suits: preset.suit_states.iter().map(PresetSuit::from).collect(),
            })
            .collect();
        write_json_atomic(path, &records)
    }
}
