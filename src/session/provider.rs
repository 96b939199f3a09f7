// Track data collaborator
use std::future::Future;

use crate::settings::TrackSettings;

/// Where the session gets audio bytes and per-track settings from, and
/// where it hands settings back for persistence.
pub trait TrackProvider: Send + Sync + 'static {
    /// Raw file contents, or None when the file can't be read
    fn audio_data(&self, path: &str) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Stored settings for a track, or None when nothing was saved
    fn track_settings(&self, path: &str) -> impl Future<Output = Option<TrackSettings>> + Send;

    /// Fire-and-forget; implementations debounce their own writes
    fn save_track_settings(&self, path: &str, settings: &TrackSettings);
}
