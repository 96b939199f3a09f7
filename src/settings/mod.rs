// Settings module
// Per-track playback settings and application configuration

pub mod config;
pub mod track_settings;

pub use config::PlayerConfig;
pub use track_settings::{TrackSettings, TrackSettingsStore};
