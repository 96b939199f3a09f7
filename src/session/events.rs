// Session notifications and snapshot types
use serde::Serialize;

use crate::settings::TrackSettings;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed { message: String },
}

/// Everything the session tells its UI, in the order it happens
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    LoadStarted { path: String },
    Loaded { path: String, duration: f64 },
    LoadFailed { path: String, message: String },
    SettingsApplied { settings: TrackSettings },
    PlaybackChanged { playing: bool, position: f64 },
    Progress { position: f64, duration: f64 },
    Spectrum { bins: Vec<u8> },
    TrackEnded { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub path: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub playing: bool,
    pub load_state: LoadState,
    pub settings: TrackSettings,
    pub visuals_enabled: bool,
}
