use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;

use crate::playlist::{FileEnumerator, FileFetcher, LineParser, PlaylistCandidates, SourceError};
use crate::publish::{publish, record_last_run, LinkOutcome, PublishSettings};
use crate::reconcile::{reconcile, ReconcilePolicy};
use crate::source::read_existing;
use crate::store::{RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Record store failed: {0}")]
    Store(#[from] StoreError),
    #[error("Playlist source failed: {0}")]
    Source(#[from] SourceError),
}

/// Steps of a single pass, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    RecordingLastRun,
    ListingSources,
    PublishSentinel,
    ReadExisting,
    Reconcile,
    Publish,
}

/// Which way the pass went once sources were listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBranch {
    NoSourceFiles,
    Reconciled,
}

/// The external pieces a pass talks to, besides the record store.
pub struct Collaborators<'a> {
    pub enumerator: &'a dyn FileEnumerator,
    pub fetcher: &'a dyn FileFetcher,
    pub parser: &'a dyn LineParser,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub publish: PublishSettings,
    pub policy: ReconcilePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub branch: RunBranch,
    pub files_found: usize,
    pub existing_entries: usize,
    pub new_entries: usize,
    pub batches_failed: usize,
    pub rows_written: usize,
    pub sentinel: bool,
    pub links: LinkOutcome,
}

fn enter(state: RunState) {
    log::debug!("-> {state:?}");
}

/// One full pass: stamp the last-run cell, list playlist files, merge them
/// into what is already published and write the result back.
///
/// There is no retry. Listing failures and store errors end the pass; a file
/// that fails to fetch is skipped; a refused link write is only reported.
pub fn run_once(
    store: &mut dyn RecordStore,
    sources: &Collaborators<'_>,
    settings: &RunSettings,
    now: &DateTime<Tz>,
) -> Result<RunReport, RunError> {
    enter(RunState::RecordingLastRun);
    record_last_run(store, &settings.publish.layout, now)?;

    enter(RunState::ListingSources);
    let files = sources.enumerator.list_candidate_files()?;
    let files_found = files.len();

    if files.is_empty() {
        log::info!("No playlist files found");
        enter(RunState::PublishSentinel);
        let outcome = publish(store, &settings.publish, &[], now)?;
        return Ok(RunReport {
            branch: RunBranch::NoSourceFiles,
            files_found,
            existing_entries: 0,
            new_entries: 0,
            batches_failed: 0,
            rows_written: outcome.rows_written,
            sentinel: outcome.sentinel,
            links: outcome.links,
        });
    }
    log::info!("Found {files_found} playlist files");

    enter(RunState::ReadExisting);
    let existing = read_existing(
        store,
        &settings.publish.layout,
        &settings.publish.no_history_label,
    )?;

    enter(RunState::Reconcile);
    let mut candidates = PlaylistCandidates::new(files, sources.fetcher, sources.parser);
    let merged = reconcile(&existing, &mut candidates, &settings.policy);

    enter(RunState::Publish);
    let outcome = publish(store, &settings.publish, &merged.entries, now)?;

    Ok(RunReport {
        branch: RunBranch::Reconciled,
        files_found,
        existing_entries: existing.len(),
        new_entries: merged.new_entries,
        batches_failed: merged.batches_failed,
        rows_written: outcome.rows_written,
        sentinel: outcome.sentinel,
        links: outcome.links,
    })
}
