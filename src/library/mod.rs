// Library module
// Folder scanning and watching, the visible track order, and the local
// filesystem track provider

pub mod provider;
pub mod scanner;
pub mod tracklist;
pub mod watcher;

pub use provider::LocalLibrary;
pub use scanner::{DirectoryScanner, FolderListing, TrackEntry};
pub use tracklist::TrackList;
pub use watcher::LibraryWatcher;
