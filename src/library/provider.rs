// Filesystem-backed track provider
use std::sync::Arc;

use crate::session::TrackProvider;
use crate::settings::{TrackSettings, TrackSettingsStore};

/// Reads audio straight from disk and keeps settings in the JSON store
pub struct LocalLibrary {
    settings: Arc<TrackSettingsStore>,
}

impl LocalLibrary {
    pub fn new(settings: Arc<TrackSettingsStore>) -> Self {
        Self { settings }
    }
}

impl TrackProvider for LocalLibrary {
    async fn audio_data(&self, path: &str) -> Option<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::error!("[Library] Failed to read {}: {}", path, e);
                None
            }
        }
    }

    async fn track_settings(&self, path: &str) -> Option<TrackSettings> {
        self.settings.get(path)
    }

    fn save_track_settings(&self, path: &str, settings: &TrackSettings) {
        self.settings.set(path, settings.clone());
    }
}
