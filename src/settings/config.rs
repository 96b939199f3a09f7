// Application configuration and persistence
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounds for the reduced-visual position update interval
const REDUCED_INTERVAL_RANGE: (u64, u64) = (200, 500);

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub version: i32, // Config schema version for future migrations
    pub scan_subfolders: bool,
    pub visuals_enabled: bool,
    /// Device-level volume in percent, applied after the processing chain
    pub global_volume: u8,
    pub last_folder: Option<PathBuf>,
    pub frame_interval_ms: u64,
    pub reduced_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            scan_subfolders: true,
            visuals_enabled: true,
            global_volume: 100,
            last_folder: None,
            frame_interval_ms: 16,
            reduced_interval_ms: 200,
        }
    }
}

impl PlayerConfig {
    pub fn get_config_path(app_dir: &Path) -> PathBuf {
        app_dir.join("config.json")
    }

    /// Load config from file, or return defaults if the file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_config_path(app_dir);

        if !path.exists() {
            log::info!("[Config] No config file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: PlayerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        log::info!("[Config] Loaded config from {:?}", path);
        Ok(config.sanitized())
    }

    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir)
            .with_context(|| format!("Failed to create config directory {:?}", app_dir))?;

        let path = Self::get_config_path(app_dir);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).with_context(|| format!("Failed to write config file {:?}", path))?;

        log::info!("[Config] Saved config to {:?}", path);
        Ok(())
    }

    /// Pull out-of-range values back into range
    pub fn sanitized(mut self) -> Self {
        self.global_volume = self.global_volume.min(100);
        self.frame_interval_ms = self.frame_interval_ms.clamp(4, 100);
        self.reduced_interval_ms = self
            .reduced_interval_ms
            .clamp(REDUCED_INTERVAL_RANGE.0, REDUCED_INTERVAL_RANGE.1);
        self
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn reduced_interval(&self) -> Duration {
        Duration::from_millis(self.reduced_interval_ms)
    }
}
