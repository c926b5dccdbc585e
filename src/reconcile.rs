use chrono::NaiveDateTime;
use std::collections::{HashSet, VecDeque};

use crate::dedup::{dedup_key, dedup_key_set};
use crate::entry::Entry;
use crate::playlist::SourceError;

/// Entries parsed from one playlist file.
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    /// Where the batch came from (file name), for logging.
    pub label: String,
    pub entries: Vec<Entry>,
}

/// Lazy producer of candidate batches, newest file first.
///
/// `seen` holds the dedupe keys accepted so far. Producers may use it to skip
/// work, but the reconciler checks identity again on merge.
pub trait CandidateSource {
    /// The next batch, or `None` once every file has been produced.
    fn next_batch(&mut self, seen: &HashSet<String>) -> Option<Result<CandidateBatch, SourceError>>;
}

/// A fixed list of batches. Ignores `seen`.
#[derive(Debug, Default)]
pub struct StaticBatches {
    batches: VecDeque<Result<CandidateBatch, SourceError>>,
}

impl StaticBatches {
    pub fn new(batches: Vec<Result<CandidateBatch, SourceError>>) -> Self {
        Self { batches: batches.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CandidateSource for StaticBatches {
    fn next_batch(&mut self, _seen: &HashSet<String>) -> Option<Result<CandidateBatch, SourceError>> {
        self.batches.pop_front()
    }
}

/// When to stop pulling further batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EarlyStop {
    /// Stop once the new entries alone reach the cap. A full record is still
    /// scanned for newer plays.
    #[default]
    NewEntries,
    /// Stop once existing plus new entries reach the cap.
    Combined,
}

#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    pub max_entries: usize,
    /// Entries strictly before this instant, or with a timestamp that does not
    /// parse, are dropped.
    pub cutoff: Option<NaiveDateTime>,
    pub early_stop: EarlyStop,
}

impl ReconcilePolicy {
    pub fn capped(max_entries: usize) -> Self {
        Self {
            max_entries,
            cutoff: None,
            early_stop: EarlyStop::default(),
        }
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Newest first, capped.
    pub entries: Vec<Entry>,
    pub batches_pulled: usize,
    pub batches_failed: usize,
    /// Entries accepted from batches before filtering and capping.
    pub new_entries: usize,
}

/// Merge `existing` with batches from `source`, dedupe by identity, apply the
/// cutoff, sort newest first and cap.
pub fn reconcile(
    existing: &[Entry],
    source: &mut dyn CandidateSource,
    policy: &ReconcilePolicy,
) -> Reconciliation {
    let mut seen = dedup_key_set(existing);
    let mut new_entries: Vec<Entry> = Vec::new();
    let mut result = Reconciliation::default();

    loop {
        let accumulated = match policy.early_stop {
            EarlyStop::NewEntries => new_entries.len(),
            EarlyStop::Combined => existing.len() + new_entries.len(),
        };
        if accumulated >= policy.max_entries {
            log::debug!("Collected {accumulated} entries, not pulling further batches");
            break;
        }

        let Some(next) = source.next_batch(&seen) else {
            break;
        };
        result.batches_pulled += 1;

        let batch = match next {
            Ok(batch) => batch,
            Err(e) => {
                result.batches_failed += 1;
                log::warn!("Skipping candidate batch: {e}");
                continue;
            }
        };

        let before = new_entries.len();
        for entry in batch.entries {
            if seen.insert(dedup_key(&entry)) {
                new_entries.push(entry);
            }
        }
        log::info!(
            "Parsed {} new entries from {}",
            new_entries.len() - before,
            batch.label
        );
    }

    result.new_entries = new_entries.len();

    // Entry is always a (timestamp, title, artist) triple, no reshaping needed.
    let mut combined: Vec<Entry> = existing.iter().cloned().chain(new_entries).collect();

    if let Some(cutoff) = policy.cutoff {
        let before = combined.len();
        combined.retain(|e| e.parsed_timestamp().is_some_and(|ts| ts >= cutoff));
        log::debug!("Cutoff {cutoff} dropped {} entries", before - combined.len());
    }

    sort_newest_first(&mut combined);
    combined.truncate(policy.max_entries);

    result.entries = combined;
    result
}

/// Stable sort by parsed timestamp, newest first. Unparseable timestamps
/// count as the oldest possible value.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by_key(|e| std::cmp::Reverse(e.parsed_timestamp().unwrap_or(NaiveDateTime::MIN)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_timestamp;

    fn entry(ts: &str, title: &str, artist: &str) -> Entry {
        Entry::new(ts, title, artist)
    }

    fn batch(label: &str, entries: Vec<Entry>) -> Result<CandidateBatch, SourceError> {
        Ok(CandidateBatch { label: label.to_string(), entries })
    }

    fn failed(label: &str) -> Result<CandidateBatch, SourceError> {
        Err(SourceError::Fetch {
            file: label.to_string(),
            message: "connection reset".to_string(),
        })
    }

    /// Counts pulls and records the seen set it was handed each time.
    struct RecordingSource {
        inner: StaticBatches,
        seen_sizes: Vec<usize>,
    }

    impl CandidateSource for RecordingSource {
        fn next_batch(&mut self, seen: &HashSet<String>) -> Option<Result<CandidateBatch, SourceError>> {
            self.seen_sizes.push(seen.len());
            self.inner.next_batch(seen)
        }
    }

    #[test]
    fn test_entries_pass_through_verbatim() {
        let existing = vec![entry("2025-01-02 10:00", " Tweezer ", "Phish")];
        let mut source = StaticBatches::new(vec![batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "Arcadia", "")])]);

        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(5));
        assert_eq!(
            out.entries,
            vec![entry("2025-01-03 10:00", "Arcadia", ""), entry("2025-01-02 10:00", " Tweezer ", "Phish")]
        );
    }

    #[test]
    fn test_newer_candidate_goes_first() {
        let existing = vec![entry("2025-01-02 10:00", "A", "X")];
        let mut source = StaticBatches::new(vec![batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "B", "Y")])]);

        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(5));
        assert_eq!(
            out.entries,
            vec![entry("2025-01-03 10:00", "B", "Y"), entry("2025-01-02 10:00", "A", "X")]
        );
        assert_eq!(out.new_entries, 1);
        assert_eq!(out.batches_pulled, 1);
    }

    #[test]
    fn test_cap_keeps_newest() {
        let existing = vec![entry("2025-01-02 10:00", "A", "X")];
        let mut source = StaticBatches::new(vec![batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "B", "Y")])]);

        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(1));
        assert_eq!(out.entries, vec![entry("2025-01-03 10:00", "B", "Y")]);
    }

    #[test]
    fn test_empty_source_returns_existing_sorted() {
        let existing = vec![
            entry("2025-01-01 09:00", "Old", "X"),
            entry("2025-01-03 09:00", "New", "Y"),
            entry("2025-01-02 09:00", "Mid", "Z"),
        ];
        let out = reconcile(&existing, &mut StaticBatches::empty(), &ReconcilePolicy::capped(10));

        let titles: Vec<&str> = out.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["New", "Mid", "Old"]);
        assert_eq!(out.new_entries, 0);
        assert_eq!(out.batches_pulled, 0);
    }

    #[test]
    fn test_nothing_in_nothing_out() {
        let out = reconcile(&[], &mut StaticBatches::empty(), &ReconcilePolicy::capped(50));
        assert!(out.entries.is_empty());
    }

    #[test]
    fn test_duplicate_of_existing_contributes_nothing() {
        let existing = vec![entry("2025-01-02 10:00", "A", "X")];
        let mut source = StaticBatches::new(vec![batch(
            "2025-01-02.m3u",
            vec![entry(" 2025-01-02 10:00 ", "a", " X")],
        )]);

        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(5));
        assert_eq!(out.entries, existing);
        assert_eq!(out.new_entries, 0);
    }

    #[test]
    fn test_duplicates_across_and_within_batches() {
        let mut source = StaticBatches::new(vec![
            batch("2025-01-03.m3u", vec![
                entry("2025-01-03 10:00", "B", "Y"),
                entry("2025-01-03 10:00", "B", "Y"),
            ]),
            batch("2025-01-02.m3u", vec![entry("2025-01-03 10:00", "b", "y")]),
        ]);

        let out = reconcile(&[], &mut source, &ReconcilePolicy::capped(5));
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.batches_pulled, 2);
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let mut source = StaticBatches::new(vec![
            failed("2025-01-04.m3u"),
            batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "B", "Y")]),
        ]);

        let out = reconcile(&[], &mut source, &ReconcilePolicy::capped(5));
        assert_eq!(out.entries, vec![entry("2025-01-03 10:00", "B", "Y")]);
        assert_eq!(out.batches_pulled, 2);
        assert_eq!(out.batches_failed, 1);
    }

    #[test]
    fn test_unparseable_timestamps_sort_last_without_cutoff() {
        let existing = vec![
            entry("garbage", "Broken", "X"),
            entry("2025-01-02 10:00", "A", "X"),
        ];
        let out = reconcile(&existing, &mut StaticBatches::empty(), &ReconcilePolicy::capped(5));
        let titles: Vec<&str> = out.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["A", "Broken"]);
    }

    #[test]
    fn test_cutoff_drops_old_and_unparseable() {
        let existing = vec![
            entry("2025-10-26 23:00", "Old Song", "Artist 1"),
            entry("2025-10-27 00:30", "New Song", "Artist 2"),
            entry("not a time", "Broken", "Artist 3"),
        ];
        let policy = ReconcilePolicy {
            cutoff: parse_timestamp("2025-10-27 00:00"),
            ..ReconcilePolicy::capped(10)
        };

        let out = reconcile(&existing, &mut StaticBatches::empty(), &policy);
        assert_eq!(out.entries, vec![entry("2025-10-27 00:30", "New Song", "Artist 2")]);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let existing = vec![entry("2025-10-27 00:00", "Edge", "X")];
        let policy = ReconcilePolicy {
            cutoff: parse_timestamp("2025-10-27 00:00"),
            ..ReconcilePolicy::capped(10)
        };
        let out = reconcile(&existing, &mut StaticBatches::empty(), &policy);
        assert_eq!(out.entries.len(), 1);
    }

    #[test]
    fn test_equal_timestamps_keep_merge_order() {
        let existing = vec![entry("2025-01-02 10:00", "First", "X")];
        let mut source = StaticBatches::new(vec![batch("f", vec![entry("2025-01-02 10:00", "Second", "Y")])]);
        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(5));
        let titles: Vec<&str> = out.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_new_entries_early_stop_still_scans_full_record() {
        let existing = vec![
            entry("2025-01-01 10:00", "A", "X"),
            entry("2025-01-01 11:00", "B", "X"),
        ];
        let mut source = RecordingSource {
            inner: StaticBatches::new(vec![
                batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "C", "Y")]),
                batch("2025-01-02.m3u", vec![entry("2025-01-02 10:00", "D", "Y")]),
                batch("2025-01-01.m3u", vec![entry("2025-01-01 09:00", "E", "Y")]),
            ]),
            seen_sizes: Vec::new(),
        };

        let out = reconcile(&existing, &mut source, &ReconcilePolicy::capped(2));
        // Two new entries reach the cap, the third file is never pulled.
        assert_eq!(out.batches_pulled, 2);
        let titles: Vec<&str> = out.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["C", "D"]);
        // The seen set grows as batches are accepted.
        assert_eq!(source.seen_sizes, vec![2, 3]);
    }

    #[test]
    fn test_combined_early_stop_counts_existing() {
        let existing = vec![entry("2025-01-01 10:00", "A", "X")];
        let mut source = StaticBatches::new(vec![
            batch("2025-01-03.m3u", vec![entry("2025-01-03 10:00", "C", "Y")]),
            batch("2025-01-02.m3u", vec![entry("2025-01-02 10:00", "D", "Y")]),
        ]);
        let policy = ReconcilePolicy {
            early_stop: EarlyStop::Combined,
            ..ReconcilePolicy::capped(2)
        };

        let out = reconcile(&existing, &mut source, &policy);
        assert_eq!(out.batches_pulled, 1);
        let titles: Vec<&str> = out.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["C", "A"]);
    }

    #[test]
    fn test_early_stop_does_not_change_outcome_of_pulled_batches() {
        let existing = vec![entry("2025-01-05 10:00", "Newest", "X")];
        let batches = || {
            StaticBatches::new(vec![batch("f", vec![
                entry("2025-01-01 10:00", "Oldest", "Y"),
                entry("2025-01-04 10:00", "Newer", "Y"),
            ])])
        };

        let stop_early = reconcile(&existing, &mut batches(), &ReconcilePolicy::capped(2));
        let policy = ReconcilePolicy { early_stop: EarlyStop::Combined, ..ReconcilePolicy::capped(2) };
        let stop_combined = reconcile(&existing, &mut batches(), &policy);

        let titles: Vec<&str> = stop_early.entries.iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["Newest", "Newer"]);
        assert_eq!(stop_early.entries, stop_combined.entries);
    }
}
