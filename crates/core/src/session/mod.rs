use std::{path::Path, thread, time::Duration};

use crate::{
    codec, config::ensure_config_files, storage, AppConfig, AudioClip, ConfigPaths,
    DistributionClient, DistributionReport, ImportMode, PlaybackClock, Result, ScrollAction,
    Spectrogram, SpectrogramEngine, SuitRegistry, SuitState, ViewportMapper, VisualElement,
    Waypoint, WaypointTimeline,
};

/// How often the follow loop samples the playback clock.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Result of one poll of the playback clock.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub position: f64,
    pub scroll: ScrollAction,
    /// Suit states of a waypoint the cursor just crossed.
    pub states: Option<Vec<SuitState>>,
}

impl TickOutput {
    pub fn is_quiet(&self) -> bool {
        self.scroll == ScrollAction::Stay && self.states.is_none()
    }
}

/// Application context of the editor.
///
/// Owns the suit registry, the configuration and every piece of timeline,
/// viewport and spectrogram state. Only the playback clock is shared with
/// another thread.
#[derive(Debug)]
pub struct EditorSession {
    config: AppConfig,
    registry: SuitRegistry,
    clock: PlaybackClock,
    engine: SpectrogramEngine,
    spectrogram: Spectrogram,
    viewport: ViewportMapper,
    timeline: WaypointTimeline,
}

impl EditorSession {
    pub fn new(config: AppConfig, registry: SuitRegistry, width_pixels: f32) -> Self {
        let clock = PlaybackClock::default();
        let timeline = WaypointTimeline::new(config.num_suits, clock.clone());
        Self {
            config,
            registry,
            clock,
            engine: SpectrogramEngine::new(),
            spectrogram: Spectrogram::empty(),
            viewport: ViewportMapper::new(width_pixels),
            timeline,
        }
    }

    /// Reads the configuration directory, creating default files first when
    /// they are missing.
    pub fn open(paths: &ConfigPaths, width_pixels: f32) -> Result<Self> {
        ensure_config_files(paths)?;
        let config = AppConfig::load(&paths.app_config());
        let registry = SuitRegistry::load(&paths.suits(), config.network.suit_port)?;
        if registry.len() != config.num_suits {
            tracing::warn!(
                suits = config.num_suits,
                profiles = registry.len(),
                "suit config does not list one entry per suit"
            );
        }
        Ok(Self::new(config, registry, width_pixels))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &SuitRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn spectrogram(&self) -> &Spectrogram {
        &self.spectrogram
    }

    pub fn viewport(&self) -> &ViewportMapper {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportMapper {
        &mut self.viewport
    }

    pub fn timeline(&self) -> &WaypointTimeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut WaypointTimeline {
        &mut self.timeline
    }

    /// Analyses a clip and resets playback and the view onto it. Only mono
    /// clips are accepted; callers that want stereo files downmix them with
    /// [`AudioClip::to_mono`] first.
    pub fn load_audio(&mut self, clip: &AudioClip) -> Result<()> {
        let spectrogram = self.engine.compute(clip, &self.config.spectrogram)?;

        self.clock.stop();
        self.clock.set_duration(clip.duration_seconds());
        self.viewport
            .load(spectrogram.frames(), spectrogram.duration_seconds());
        self.spectrogram = spectrogram;
        Ok(())
    }

    pub fn set_suit_count(&mut self, suit_count: usize) -> Result<()> {
        self.timeline.set_suit_count(suit_count)?;
        self.config.num_suits = suit_count;
        Ok(())
    }

    /// Polls the clock once: keeps the cursor on screen and reports a newly
    /// active waypoint.
    pub fn tick(&mut self) -> TickOutput {
        let position = self.clock.position();
        let scroll = self.viewport.follow(position);
        let states = self.timeline.cursor_advance(position).map(<[SuitState]>::to_vec);
        TickOutput {
            position,
            scroll,
            states,
        }
    }

    /// Calls `tick` every [`POLL_INTERVAL`] while the clock plays and hands
    /// every non-quiet output to `on_tick`. One last tick runs after playback
    /// stops so a waypoint at the very end is not missed.
    pub fn run_follow_loop<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(&TickOutput),
    {
        while self.clock.is_playing() {
            let output = self.tick();
            if !output.is_quiet() {
                on_tick(&output);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let output = self.tick();
        if !output.is_quiet() {
            on_tick(&output);
        }
    }

    /// Adds a waypoint holding `states` at the current playback position.
    pub fn capture_waypoint(&mut self, states: Vec<SuitState>) -> Result<usize> {
        let waypoint = Waypoint::new(self.clock.position(), states);
        self.timeline.add(waypoint)
    }

    /// Click on the spectrogram view: selects the marker under `x`, or seeks
    /// to the clicked column.
    pub fn click(&mut self, x: f32) -> Result<VisualElement> {
        let element = self.timeline.hit_test(x, &self.viewport);
        match element {
            VisualElement::Marker { index, .. } => self.timeline.select(index)?,
            VisualElement::Spectrogram { column } => {
                self.timeline.clear_selection();
                let time = self
                    .viewport
                    .column_to_time(column as f64)
                    .min(self.clock.duration());
                self.clock.seek(time)?;
            }
        }
        Ok(element)
    }

    /// Encodes the timeline for every suit that has an endpoint.
    pub fn export(&self) -> Result<Vec<Vec<u8>>> {
        codec::encode(
            &self.timeline.to_vec(),
            self.timeline.suit_count(),
            self.registry.connections().len(),
        )
    }

    pub fn send(&self, client: &DistributionClient) -> Result<DistributionReport> {
        let connections = self.registry.connections();
        let streams = codec::encode(
            &self.timeline.to_vec(),
            self.timeline.suit_count(),
            connections.len(),
        )?;
        client.distribute(&streams, &connections)
    }

    pub fn import_waypoints(&mut self, path: &Path, mode: ImportMode) -> Result<usize> {
        let waypoints = storage::load_waypoints(path)?;
        self.timeline.import(waypoints, mode)
    }

    pub fn save_waypoints(&self, path: &Path) -> Result<()> {
        storage::save_waypoints(path, &self.timeline.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SecondaryColorFlags, SuitProfile},
        LedSuitError, PartColor, SpectrogramConfig, WallClockDriver,
    };
    use std::{io::Read, net::TcpListener};

    fn sine_clip(seconds: f64, sample_rate: u32) -> AudioClip {
        let len = (seconds * sample_rate as f64) as usize;
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioClip::mono(samples, sample_rate).unwrap()
    }

    fn profile(ip: &str) -> SuitProfile {
        SuitProfile {
            name: "Suit".into(),
            ip: ip.into(),
            color: SecondaryColorFlags::default(),
        }
    }

    fn session(suits: usize, registry: SuitRegistry) -> EditorSession {
        let config = AppConfig {
            num_suits: suits,
            spectrogram: SpectrogramConfig {
                sample_rate: 8000,
                fft_size: 256,
                hop_size: 128,
                max_frequency: 1000.0,
            },
            ..AppConfig::default()
        };
        let mut session = EditorSession::new(config, registry, 62.0);
        session.load_audio(&sine_clip(2.0, 8000)).unwrap();
        session
    }

    fn lit_head() -> SuitState {
        SuitState {
            head: PartColor::RED,
            ..Default::default()
        }
    }

    #[test]
    fn loading_audio_sizes_view_and_clock() {
        let session = session(1, SuitRegistry::default());
        assert_eq!(session.spectrogram().frames(), 124);
        assert_eq!(session.viewport().total_columns(), 124);
        assert_eq!(session.viewport().visible_columns(), 62);
        assert!((session.clock().duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn stereo_clips_are_rejected_until_downmixed() {
        let mut session = session(1, SuitRegistry::default());
        let mono = sine_clip(1.0, 8000);
        let interleaved: Vec<f32> = mono.samples().iter().flat_map(|s| [*s, *s]).collect();
        let stereo = AudioClip::new(interleaved, 8000, 2).unwrap();

        assert!(matches!(
            session.load_audio(&stereo),
            Err(LedSuitError::UnsupportedChannels(2))
        ));
        assert_eq!(session.spectrogram().frames(), 124);
        assert!((session.clock().duration() - 2.0).abs() < 1e-9);

        session.load_audio(&stereo.to_mono()).unwrap();
        assert_eq!(session.spectrogram().frames(), 61);
        assert!((session.clock().duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tick_scrolls_and_emits_waypoints() {
        let mut session = session(1, SuitRegistry::default());
        session
            .timeline_mut()
            .add(Waypoint::new(0.5, vec![lit_head()]))
            .unwrap();
        session
            .timeline_mut()
            .add(Waypoint::new(1.5, vec![SuitState::default()]))
            .unwrap();

        session.clock().seek(0.6).unwrap();
        let output = session.tick();
        assert_eq!(output.scroll, ScrollAction::Stay);
        assert_eq!(output.states, Some(vec![lit_head()]));
        assert!(session.tick().is_quiet());

        session.clock().seek(1.6).unwrap();
        let output = session.tick();
        assert_eq!(output.scroll, ScrollAction::Forward);
        assert_eq!(output.states, Some(vec![SuitState::default()]));
        assert_eq!(session.viewport().offset(), 62);

        session.clock().seek(0.2).unwrap();
        assert_eq!(session.tick().scroll, ScrollAction::Backward);
        assert_eq!(session.viewport().offset(), 0);
    }

    #[test]
    fn click_selects_markers_or_seeks() {
        let mut session = session(1, SuitRegistry::default());
        session
            .timeline_mut()
            .add(Waypoint::new(0.5, vec![lit_head()]))
            .unwrap();

        assert!(matches!(
            session.click(31.0).unwrap(),
            VisualElement::Marker { index: 0, .. }
        ));
        assert_eq!(session.timeline().selected(), Some(0));

        assert_eq!(
            session.click(46.5).unwrap(),
            VisualElement::Spectrogram { column: 46 }
        );
        assert_eq!(session.timeline().selected(), None);
        assert!((session.clock().position() - 46.0 * 2.0 / 124.0).abs() < 1e-9);
    }

    #[test]
    fn capture_is_refused_while_playing() {
        let mut session = session(1, SuitRegistry::default());
        session.clock().seek(1.0).unwrap();
        assert_eq!(session.capture_waypoint(vec![lit_head()]).unwrap(), 0);

        session.clock().play();
        assert!(matches!(
            session.capture_waypoint(vec![lit_head()]),
            Err(LedSuitError::PlaybackActive)
        ));
        assert_eq!(session.timeline().len(), 1);
    }

    #[test]
    fn export_needs_one_connection_per_suit() {
        let registry = SuitRegistry::new(vec![profile("10.0.0.1"), profile("")], 12345);
        let mut session = session(2, registry);
        session
            .timeline_mut()
            .add(Waypoint::new(1.0, vec![lit_head(), SuitState::default()]))
            .unwrap();
        assert!(matches!(
            session.export(),
            Err(LedSuitError::SuitCountMismatch {
                suits: 2,
                connections: 1
            })
        ));

        let registry = SuitRegistry::new(vec![profile("10.0.0.1"), profile("10.0.0.2")], 12345);
        let mut session = EditorSession::new(session.config().clone(), registry, 62.0);
        session
            .timeline_mut()
            .add(Waypoint::new(1.0, vec![lit_head(), SuitState::default()]))
            .unwrap();
        let streams = session.export().unwrap();
        assert_eq!(streams[0], vec![0, 0, 0x03, 0xE8, 0x20]);
        assert_eq!(streams[1], vec![0, 0, 0x03, 0xE8, 0x00]);
    }

    #[test]
    fn send_delivers_encoded_timeline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        });

        let registry = SuitRegistry::new(vec![profile("127.0.0.1")], port);
        let mut session = session(1, registry);
        session
            .timeline_mut()
            .add(Waypoint::new(1.2345, vec![lit_head()]))
            .unwrap();

        let report = session.send(&DistributionClient::default()).unwrap();
        assert_eq!(report.total_bytes(), 5);
        assert_eq!(reader.join().unwrap(), vec![0x00, 0x00, 0x04, 0xD3, 0x20]);
    }

    #[test]
    fn follow_loop_reports_waypoint_at_the_end() {
        let mut session = session(1, SuitRegistry::default());
        session
            .timeline_mut()
            .add(Waypoint::new(1.95, vec![lit_head()]))
            .unwrap();
        session.clock().seek(1.9).unwrap();
        session.clock().play();
        let driver = WallClockDriver::spawn(session.clock().clone(), Duration::from_millis(1));

        let mut emitted = Vec::new();
        session.run_follow_loop(|output| {
            if let Some(states) = &output.states {
                emitted.push(states.clone());
            }
        });
        driver.stop().unwrap();

        assert_eq!(emitted, vec![vec![lit_head()]]);
        assert!(!session.clock().is_playing());
    }

    #[test]
    fn waypoint_files_round_trip_through_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.json");
        let mut session = session(1, SuitRegistry::default());
        session
            .timeline_mut()
            .add(Waypoint::new(0.25, vec![lit_head()]))
            .unwrap();
        session.save_waypoints(&path).unwrap();

        let mut other = EditorSession::new(session.config().clone(), SuitRegistry::default(), 62.0);
        assert_eq!(other.import_waypoints(&path, ImportMode::Append).unwrap(), 1);
        assert_eq!(other.timeline().to_vec(), session.timeline().to_vec());
    }
}
