// Tauri command handlers
use std::path::PathBuf;
use tauri::{AppHandle, State};
use tauri_plugin_dialog::DialogExt;

use crate::library::FolderListing;
use crate::session::PlayerSnapshot;
use crate::settings::PlayerConfig;
use crate::state::AppState;

// ===== Library Commands =====

/// Ask for a folder, then scan and watch it. None when the dialog is cancelled.
#[tauri::command]
pub async fn select_folder(
    recursive: Option<bool>,
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<Option<Vec<FolderListing>>, String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    app.dialog().file().pick_folder(move |folder| {
        let _ = tx.send(folder);
    });

    let Some(folder) = rx.await.map_err(|e| format!("Folder dialog closed unexpectedly: {}", e))? else {
        return Ok(None);
    };
    let folder = folder
        .into_path()
        .map_err(|e| format!("Invalid folder: {}", e))?;

    let recursive = recursive.unwrap_or_else(|| state.config.lock().scan_subfolders);
    state
        .open_folder(folder, recursive)
        .await
        .map(Some)
        .map_err(|e| format!("Failed to scan folder: {:#}", e))
}

#[tauri::command]
pub async fn open_folder(
    folder: String,
    recursive: bool,
    state: State<'_, AppState>,
) -> Result<Vec<FolderListing>, String> {
    state
        .open_folder(PathBuf::from(folder), recursive)
        .await
        .map_err(|e| format!("Failed to scan folder: {:#}", e))
}

#[tauri::command]
pub fn set_track_filter(filter: String, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_track_filter(&filter);
    Ok(())
}

// ===== Playback Commands =====

#[tauri::command]
pub async fn load_track(path: String, state: State<'_, AppState>) -> Result<(), String> {
    state.session.load_track(&path).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn toggle_play_pause(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.session.toggle_play_pause())
}

#[tauri::command]
pub fn toggle_with_return(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.session.toggle_with_return())
}

#[tauri::command]
pub fn stop_with_return(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.session.stop_with_return())
}

#[tauri::command]
pub fn seek(fraction: f64, state: State<'_, AppState>) -> Result<Option<f64>, String> {
    Ok(state.session.seek(fraction))
}

#[tauri::command]
pub fn set_seek_dragging(dragging: bool, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_seek_dragging(dragging);
    Ok(())
}

#[tauri::command]
pub async fn next_track(state: State<'_, AppState>) -> Result<bool, String> {
    state.session.advance_to_next().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn previous_track(state: State<'_, AppState>) -> Result<bool, String> {
    state.session.advance_to_previous().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_player_state(state: State<'_, AppState>) -> Result<PlayerSnapshot, String> {
    Ok(state.session.snapshot())
}

// ===== Track Settings Commands =====

#[tauri::command]
pub fn set_volume(volume: f32, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_volume(volume);
    Ok(())
}

#[tauri::command]
pub fn set_speed(speed: f32, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_speed(speed);
    Ok(())
}

#[tauri::command]
pub fn set_eq_band(band: usize, gain: f32, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_eq_band(band, gain).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn reset_track_settings(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.session.reset_track_settings())
}

#[tauri::command]
pub fn save_track_settings(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.session.save_current_settings())
}

// ===== App Settings Commands =====

#[tauri::command]
pub fn get_config(state: State<'_, AppState>) -> Result<PlayerConfig, String> {
    Ok(state.config.lock().clone())
}

#[tauri::command]
pub fn set_visuals_enabled(enabled: bool, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_visuals_enabled(enabled);
    state.update_config(|config| config.visuals_enabled = enabled);
    Ok(())
}

#[tauri::command]
pub fn set_global_volume(volume: u8, state: State<'_, AppState>) -> Result<(), String> {
    let volume = volume.min(100);
    state.output.set_volume(volume);
    state.update_config(|config| config.global_volume = volume);
    Ok(())
}

#[tauri::command]
pub fn play_test_sound(state: State<'_, AppState>) -> Result<(), String> {
    state.session.play_test_sound();
    Ok(())
}

#[tauri::command]
pub fn set_scan_subfolders(enabled: bool, state: State<'_, AppState>) -> Result<(), String> {
    state.update_config(|config| config.scan_subfolders = enabled);
    Ok(())
}
