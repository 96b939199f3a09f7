// Folder watcher
// notify delivers raw filesystem events on its own thread; a tokio task
// coalesces them and rescans once the folder has been quiet for a while.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::scanner::{DirectoryScanner, FolderListing};

pub const RESCAN_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches one folder and sends a fresh listing after changes settle.
/// Dropping the watcher stops both the OS watch and the rescan task.
pub struct LibraryWatcher {
    folder: PathBuf,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl LibraryWatcher {
    pub fn start(
        folder: &Path,
        recursive: bool,
        listings: UnboundedSender<Vec<FolderListing>>,
        runtime: &Handle,
    ) -> anyhow::Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(e) => log::warn!("[Watcher] {}", e),
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(folder, mode)?;
        log::info!("[Watcher] Now watching: {}", folder.display());

        let task = runtime.spawn(rescan_loop(folder.to_path_buf(), recursive, event_rx, listings));

        Ok(Self {
            folder: folder.to_path_buf(),
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.task.abort();
        log::info!("[Watcher] Stopped watching: {}", self.folder.display());
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

async fn rescan_loop(
    folder: PathBuf,
    recursive: bool,
    mut events: UnboundedReceiver<Event>,
    listings: UnboundedSender<Vec<FolderListing>>,
) {
    while let Some(event) = events.recv().await {
        if !is_relevant(&event) {
            continue;
        }

        // Wait until no event has arrived for a full debounce window
        loop {
            match tokio::time::timeout(RESCAN_DEBOUNCE, events.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let scan_folder = folder.clone();
        let result = tokio::task::spawn_blocking(move || DirectoryScanner::scan(scan_folder, recursive)).await;
        match result {
            Ok(Ok(listing)) => {
                if listings.send(listing).is_err() {
                    return;
                }
            }
            Ok(Err(e)) => log::error!("[Watcher] Rescan failed: {:#}", e),
            Err(e) => log::error!("[Watcher] Rescan task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    #[test]
    fn test_access_events_are_ignored() {
        assert!(!is_relevant(&Event::new(EventKind::Access(AccessKind::Any))));
        assert!(is_relevant(&Event::new(EventKind::Create(CreateKind::File))));
    }

    #[tokio::test]
    async fn test_burst_of_events_gives_one_rescan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"").unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (listing_tx, mut listing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(rescan_loop(dir.path().to_path_buf(), true, event_rx, listing_tx));

        for _ in 0..5 {
            event_tx.send(Event::new(EventKind::Create(CreateKind::File))).unwrap();
        }

        let listing = tokio::time::timeout(Duration::from_secs(5), listing_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listing[0].tracks.len(), 1);

        tokio::time::sleep(RESCAN_DEBOUNCE * 2).await;
        assert!(listing_rx.try_recv().is_err());

        drop(event_tx);
        task.await.unwrap();
    }
}
