pub mod local;
pub mod m3u;

pub use local::LocalPlaylistDir;
pub use m3u::M3uLineParser;

use std::collections::HashSet;
use thiserror::Error;

use crate::entry::Entry;
use crate::reconcile::{CandidateBatch, CandidateSource};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Playlist directory not found: {0}")]
    MissingDir(String),
    #[error("Fetch failed for {file}: {message}")]
    Fetch { file: String, message: String },
}

/// A playlist export as listed by a [`FileEnumerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistFile {
    /// Handle understood by the matching [`FileFetcher`].
    pub id: String,
    /// Date-stamped file name, e.g. `2025-10-27.m3u`.
    pub name: String,
}

impl PlaylistFile {
    /// The file name without its `.m3u` suffix, used as the fallback date.
    pub fn date_hint(&self) -> String {
        self.name.replace(".m3u", "").trim().to_string()
    }
}

pub trait FileEnumerator {
    /// Candidate files, newest first by name.
    fn list_candidate_files(&self) -> Result<Vec<PlaylistFile>, SourceError>;
}

pub trait FileFetcher {
    /// Raw text lines of one file.
    fn fetch_lines(&self, file: &PlaylistFile) -> Result<Vec<String>, SourceError>;
}

pub trait LineParser {
    /// Parse played entries out of raw lines. Entries whose dedupe key is in
    /// `seen_keys` may be skipped; `file_date_hint` supplies the date when
    /// lines only carry a clock time.
    fn parse_entries(&self, lines: &[String], seen_keys: &HashSet<String>, file_date_hint: &str) -> Vec<Entry>;
}

/// Fetches and parses playlist files one at a time, in listing order.
pub struct PlaylistCandidates<'a> {
    files: std::vec::IntoIter<PlaylistFile>,
    fetcher: &'a dyn FileFetcher,
    parser: &'a dyn LineParser,
}

impl<'a> PlaylistCandidates<'a> {
    pub fn new(files: Vec<PlaylistFile>, fetcher: &'a dyn FileFetcher, parser: &'a dyn LineParser) -> Self {
        Self {
            files: files.into_iter(),
            fetcher,
            parser,
        }
    }
}

impl CandidateSource for PlaylistCandidates<'_> {
    fn next_batch(&mut self, seen: &HashSet<String>) -> Option<Result<CandidateBatch, SourceError>> {
        let file = self.files.next()?;
        log::debug!("Processing file: {}", file.name);

        let batch = self.fetcher.fetch_lines(&file).map(|lines| CandidateBatch {
            entries: self.parser.parse_entries(&lines, seen, &file.date_hint()),
            label: file.name.clone(),
        });
        Some(batch)
    }
}
