// Visible track order
use super::scanner::{FolderListing, TrackEntry};

/// The scanned folders plus the current name filter. Next and previous
/// walk the visible (filtered) order, flattened across folders.
#[derive(Debug, Clone, Default)]
pub struct TrackList {
    folders: Vec<FolderListing>,
    filter: String,
}

impl TrackList {
    pub fn set_folders(&mut self, folders: Vec<FolderListing>) {
        self.folders = folders;
    }

    /// Case-insensitive substring match on track names; empty shows all
    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.trim().to_lowercase();
    }

    pub fn visible(&self) -> Vec<&TrackEntry> {
        self.folders
            .iter()
            .flat_map(|folder| folder.tracks.iter())
            .filter(|track| self.filter.is_empty() || track.name.to_lowercase().contains(&self.filter))
            .collect()
    }

    fn visible_index(&self, path: &str) -> Option<(Vec<&TrackEntry>, usize)> {
        let visible = self.visible();
        let index = visible.iter().position(|t| t.path == path)?;
        Some((visible, index))
    }

    /// Track after `path` in visible order; None at the end or when `path`
    /// is filtered out
    pub fn next_after(&self, path: &str) -> Option<String> {
        let (visible, index) = self.visible_index(path)?;
        visible.get(index + 1).map(|t| t.path.clone())
    }

    pub fn previous_before(&self, path: &str) -> Option<String> {
        let (visible, index) = self.visible_index(path)?;
        index.checked_sub(1).map(|i| visible[i].path.clone())
    }
}
