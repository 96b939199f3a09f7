// Application state management
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::output::AudioOutput;
use crate::library::{DirectoryScanner, FolderListing, LibraryWatcher, LocalLibrary};
use crate::session::PlaybackSession;
use crate::settings::{PlayerConfig, TrackSettingsStore};

pub struct AppState {
    pub session: PlaybackSession<LocalLibrary>,
    pub settings: Arc<TrackSettingsStore>,
    pub config: Mutex<PlayerConfig>,
    pub output: AudioOutput,
    watcher: Mutex<Option<LibraryWatcher>>,
    listings_tx: UnboundedSender<Vec<FolderListing>>,
    runtime: Handle,
    app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        session: PlaybackSession<LocalLibrary>,
        settings: Arc<TrackSettingsStore>,
        config: PlayerConfig,
        output: AudioOutput,
        listings_tx: UnboundedSender<Vec<FolderListing>>,
        runtime: Handle,
        app_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            settings,
            config: Mutex::new(config),
            output,
            watcher: Mutex::new(None),
            listings_tx,
            runtime,
            app_dir,
        }
    }

    /// Scan `folder`, make it the current listing and watch it for changes
    pub async fn open_folder(&self, folder: PathBuf, recursive: bool) -> anyhow::Result<Vec<FolderListing>> {
        let scan_dir = folder.clone();
        let listing = tokio::task::spawn_blocking(move || DirectoryScanner::scan(scan_dir, recursive)).await??;
        self.session.set_track_listing(listing.clone());

        // The old watcher goes first so two never run at once
        self.watcher.lock().take();
        let watcher = match LibraryWatcher::start(&folder, recursive, self.listings_tx.clone(), &self.runtime) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("[Library] Watching {} failed: {:#}", folder.display(), e);
                None
            }
        };
        *self.watcher.lock() = watcher;

        self.update_config(|config| {
            config.last_folder = Some(folder);
            config.scan_subfolders = recursive;
        });
        Ok(listing)
    }

    /// Apply `change` to the config and write it out
    pub fn update_config(&self, change: impl FnOnce(&mut PlayerConfig)) {
        let mut config = self.config.lock();
        change(&mut config);
        if let Err(e) = config.save(&self.app_dir) {
            log::error!("[Config] {:#}", e);
        }
    }

    pub fn shutdown(&self) {
        self.session.dispose();
        self.watcher.lock().take();
        if let Err(e) = self.settings.flush() {
            log::error!("[Settings] {:#}", e);
        }
    }
}
