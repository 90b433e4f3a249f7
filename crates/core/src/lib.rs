//! Core library for the LED suit show editor.
//!
//! Audio is analysed into a log-frequency spectrogram that the editor scrolls
//! and zooms through. Waypoints pinned on that timeline hold the color of
//! every suit zone; they are encoded into the fixed-stride binary streams the
//! suit firmware plays back and delivered to each suit over TCP.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod session;
pub mod spectrogram;
pub mod storage;
pub mod suit;
pub mod timeline;
pub mod viewport;

pub use audio::{AudioClip, AudioPlayer, PlaybackClock, WallClockDriver};
pub use codec::{compress_suit_state, decode_stream, encode, time_to_bytes, WireRecord};
pub use config::{
    AppConfig, ConfigPaths, NetworkConfig, SpectrogramConfig, SuitConnection, SuitProfile,
    SuitRegistry,
};
pub use error::{LedSuitError, Result};
pub use net::{DistributionClient, DistributionReport};
pub use session::{EditorSession, TickOutput};
pub use spectrogram::{display_color, DisplayGrid, Spectrogram, SpectrogramEngine};
pub use storage::{Preset, PresetLibrary};
pub use suit::{PartColor, SecondaryColor, SuitPart, SuitState, Waypoint};
pub use timeline::{ImportMode, Marker, VisualElement, WaypointId, WaypointTimeline};
pub use viewport::{ScrollAction, ViewportMapper, ViewportState};
