use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List of supported audio file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEntry {
    /// File name without extension
    pub name: String,
    pub path: String,
}

/// Tracks found directly inside one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub folder: String,
    pub folder_name: String,
    pub tracks: Vec<TrackEntry>,
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Scanner for finding audio files in a directory tree
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Scan a directory and group audio files by containing folder, in
    /// traversal order. Without `recursive` only the directory itself is read.
    pub fn scan<P: AsRef<Path>>(directory: P, recursive: bool) -> Result<Vec<FolderListing>, anyhow::Error> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            anyhow::bail!("Not a directory: {}", directory.display());
        }

        let mut walker = WalkDir::new(directory)
            .follow_links(false)
            .sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut listings: Vec<FolderListing> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for entry in walker.into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("[Scanner] Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !is_audio_file(path) {
                continue;
            }

            let folder = path.parent().unwrap_or(directory).to_path_buf();
            let slot = *index.entry(folder.clone()).or_insert_with(|| {
                listings.push(FolderListing {
                    folder: folder.to_string_lossy().into_owned(),
                    folder_name: folder
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| folder.to_string_lossy().into_owned()),
                    tracks: Vec::new(),
                });
                listings.len() - 1
            });

            listings[slot].tracks.push(TrackEntry {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.to_string_lossy().into_owned(),
            });
        }

        log::info!(
            "[Scanner] Found {} tracks in {} folders under {}",
            listings.iter().map(|l| l.tracks.len()).sum::<usize>(),
            listings.len(),
            directory.display()
        );
        Ok(listings)
    }
}
