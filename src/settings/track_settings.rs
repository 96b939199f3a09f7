// Per-track settings and their JSON store
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::audio::chain::{clamp_eq_gain, EQ_BANDS};

pub const MIN_SPEED_PERCENT: f32 = 25.0;
pub const MAX_SPEED_PERCENT: f32 = 400.0;

const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Volume, speed and EQ curve remembered for one track path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    /// Percent, 0-100
    pub volume: f32,
    /// Percent of normal rate
    pub speed: f32,
    /// Band gains in dB, one per EQ band
    pub eq: Vec<f32>,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            volume: 100.0,
            speed: 100.0,
            eq: vec![0.0; EQ_BANDS],
        }
    }
}

impl TrackSettings {
    /// Clamp every value into range and pad or trim the EQ curve
    pub fn normalized(mut self) -> Self {
        self.volume = clamp_volume(self.volume);
        self.speed = clamp_speed(self.speed);
        self.eq.resize(EQ_BANDS, 0.0);
        self.eq.iter_mut().for_each(|g| *g = clamp_eq_gain(*g));
        self
    }

    /// Playback rate multiplier for the stored speed
    pub fn rate(&self) -> f64 {
        clamp_speed(self.speed) as f64 / 100.0
    }
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        100.0
    } else {
        volume.clamp(0.0, 100.0)
    }
}

pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        100.0
    } else {
        speed.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT)
    }
}

/// Path -> settings map persisted as one JSON object.
/// Writes are debounced; `flush` writes immediately.
pub struct TrackSettingsStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, TrackSettings>>,
    pending_save: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl TrackSettingsStore {
    pub const FILE_NAME: &'static str = "umplayer-settings.json";

    /// Load the store from `app_dir`. A missing or unreadable file starts empty.
    pub fn load(app_dir: &Path, runtime: Handle) -> Self {
        let path = app_dir.join(Self::FILE_NAME);
        let entries = match Self::read_entries(&path) {
            Ok(Some(entries)) => {
                log::info!("[Settings] Loaded {} track entries from {:?}", entries.len(), path);
                entries
            }
            Ok(None) => {
                log::info!("[Settings] No track settings file found, starting empty");
                HashMap::new()
            }
            Err(e) => {
                log::error!("[Settings] {:#}", e);
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
            pending_save: Mutex::new(None),
            runtime,
        }
    }

    fn read_entries(path: &Path) -> Result<Option<HashMap<String, TrackSettings>>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read track settings {:?}", path))?;
        let entries = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse track settings {:?}", path))?;
        Ok(Some(entries))
    }

    pub fn get(&self, track_path: &str) -> Option<TrackSettings> {
        self.entries.lock().get(track_path).cloned()
    }

    /// Record settings for a track and schedule a write
    pub fn set(&self, track_path: &str, settings: TrackSettings) {
        if track_path.is_empty() {
            return;
        }
        self.entries.lock().insert(track_path.to_string(), settings);
        self.schedule_save();
    }

    fn schedule_save(&self) {
        let mut pending = self.pending_save.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let path = self.path.clone();
        let snapshot = self.snapshot();
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            if let Err(e) = write_entries(&path, &snapshot) {
                log::error!("[Settings] {:#}", e);
            }
        }));
    }

    fn snapshot(&self) -> HashMap<String, TrackSettings> {
        self.entries.lock().clone()
    }

    /// Cancel any pending write and write now
    pub fn flush(&self) -> Result<()> {
        if let Some(pending) = self.pending_save.lock().take() {
            pending.abort();
        }
        write_entries(&self.path, &self.snapshot())
    }
}

fn write_entries(path: &Path, entries: &HashMap<String, TrackSettings>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(entries).context("Failed to serialize track settings")?;
    fs::write(path, content).with_context(|| format!("Failed to write track settings {:?}", path))?;
    log::debug!("[Settings] Saved {} track entries to {:?}", entries.len(), path);
    Ok(())
}
