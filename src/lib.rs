// UMPlayer - folder-based desktop audio player
// Module declarations
pub mod audio;
pub mod error;
pub mod library;
pub mod session;
pub mod settings;
pub mod transport;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod state;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::{Emitter, Manager};

    use audio::output::AudioOutput;
    use library::LocalLibrary;
    use session::PlaybackSession;
    use settings::{PlayerConfig, TrackSettingsStore};
    use state::AppState;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to start async runtime");
    tauri::async_runtime::set(runtime.handle().clone());
    let handle = runtime.handle().clone();

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            // Get app data directory
            let app_dir = app.path().app_data_dir()?;

            let config = PlayerConfig::load(&app_dir).unwrap_or_else(|e| {
                log::error!("[Config] {:#}, using defaults", e);
                PlayerConfig::default()
            });

            let (output, engine, outputs) = AudioOutput::spawn(config.global_volume)?;
            let settings = Arc::new(TrackSettingsStore::load(&app_dir, handle.clone()));
            let library = Arc::new(LocalLibrary::new(settings.clone()));
            let (session, mut events) =
                PlaybackSession::new(engine, outputs, library, &config, handle.clone());

            // Forward session events to the frontend
            let app_handle = app.handle().clone();
            handle.spawn(async move {
                while let Some(event) = events.recv().await {
                    let _ = app_handle.emit("player-event", event);
                }
            });

            // Rescans from the folder watcher replace the track list
            let (listings_tx, mut listings_rx) = tokio::sync::mpsc::unbounded_channel();
            let app_handle = app.handle().clone();
            let listing_session = session.clone();
            handle.spawn(async move {
                while let Some(listing) = listings_rx.recv().await {
                    listing_session.set_track_listing(listing.clone());
                    let _ = app_handle.emit("update-track-list", listing);
                }
            });

            let last_folder = config.last_folder.clone();
            let recursive = config.scan_subfolders;
            app.manage(AppState::new(
                session,
                settings,
                config,
                output,
                listings_tx,
                handle.clone(),
                app_dir,
            ));

            // Reopen the previous folder
            if let Some(folder) = last_folder {
                let app_handle = app.handle().clone();
                handle.spawn(async move {
                    let state = app_handle.state::<AppState>();
                    match state.open_folder(folder.clone(), recursive).await {
                        Ok(listing) => {
                            let _ = app_handle.emit("update-track-list", listing);
                        }
                        Err(e) => log::warn!("[Library] Could not reopen {}: {:#}", folder.display(), e),
                    }
                });
            }

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::select_folder,
            commands::open_folder,
            commands::set_track_filter,
            commands::load_track,
            commands::toggle_play_pause,
            commands::toggle_with_return,
            commands::stop_with_return,
            commands::seek,
            commands::set_seek_dragging,
            commands::next_track,
            commands::previous_track,
            commands::get_player_state,
            commands::set_volume,
            commands::set_speed,
            commands::set_eq_band,
            commands::reset_track_settings,
            commands::save_track_settings,
            commands::get_config,
            commands::set_visuals_enabled,
            commands::set_global_volume,
            commands::play_test_sound,
            commands::set_scan_subfolders,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app, event| {
        if let tauri::RunEvent::Exit = event {
            if let Some(state) = app.try_state::<AppState>() {
                state.shutdown();
            }
        }
    });
}
