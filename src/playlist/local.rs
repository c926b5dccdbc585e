use std::path::PathBuf;
use walkdir::WalkDir;

use super::{FileEnumerator, FileFetcher, PlaylistFile, SourceError};

/// Playlist extensions picked up from the history folder.
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u"];

/// A folder of date-stamped playlist exports, e.g. VirtualDJ's `History`.
#[derive(Debug, Clone)]
pub struct LocalPlaylistDir {
    root: PathBuf,
    recursive: bool,
}

impl LocalPlaylistDir {
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
        }
    }
}

impl FileEnumerator for LocalPlaylistDir {
    fn list_candidate_files(&self) -> Result<Vec<PlaylistFile>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::MissingDir(self.root.display().to_string()));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files: Vec<PlaylistFile> = WalkDir::new(&self.root)
            .max_depth(max_depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let ext = e
                    .path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                PLAYLIST_EXTENSIONS.contains(&ext.as_str())
            })
            .map(|e| PlaylistFile {
                id: e.path().to_string_lossy().to_string(),
                name: e.file_name().to_string_lossy().to_string(),
            })
            .collect();

        // Names are date-stamped, so reverse lexicographic order is newest first.
        files.sort_by(|a, b| b.name.cmp(&a.name).then_with(|| b.id.cmp(&a.id)));
        log::debug!("Found {} playlist files under {}", files.len(), self.root.display());
        Ok(files)
    }
}

impl FileFetcher for LocalPlaylistDir {
    fn fetch_lines(&self, file: &PlaylistFile) -> Result<Vec<String>, SourceError> {
        let bytes = std::fs::read(&file.id)?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Ok(text.lines().map(str::to_string).collect())
    }
}
