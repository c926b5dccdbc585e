use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::entry::{Entry, TIMESTAMP_FORMAT};
use crate::store::{CellRange, RecordStore, StoreError, WriteMode};

/// Search endpoint used for the per-row link.
pub const SEARCH_URL: &str = "https://www.youtube.com/results";

/// Display text of a `Hyperlink`-style link cell.
pub const LINK_LABEL: &str = "YouTube Search";

/// How the auxiliary link column is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkStyle {
    /// The bare URL, written raw.
    #[default]
    RawUrl,
    /// A `=HYPERLINK(...)` formula, written user-entered.
    Hyperlink,
}

/// Where things live in the published record.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    /// Cell holding the last-run audit timestamp.
    pub last_run_cell: CellRange,
    /// First row of the body; columns A..D are timestamp, title, artist, link.
    pub body_start_row: u32,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            last_run_cell: CellRange::cell(1, 1),
            body_start_row: 5,
        }
    }
}

impl RecordLayout {
    const TIMESTAMP_COL: u32 = 1;
    const TITLE_COL: u32 = 2;
    const ARTIST_COL: u32 = 3;
    const LINK_COL: u32 = 4;

    /// The whole body including links: `A5:D`.
    pub fn body(&self) -> CellRange {
        CellRange::open(Self::TIMESTAMP_COL, self.body_start_row, Self::LINK_COL)
    }

    /// The entry columns of the body: `A5:C`.
    pub fn entry_columns(&self) -> CellRange {
        CellRange::open(Self::TIMESTAMP_COL, self.body_start_row, Self::ARTIST_COL)
    }

    /// The single sentinel row: `A5:B5`.
    pub fn sentinel_row(&self) -> CellRange {
        CellRange::bounded(Self::TIMESTAMP_COL, self.body_start_row, Self::TITLE_COL, self.body_start_row)
    }

    fn last_row(&self, count: usize) -> u32 {
        self.body_start_row + count.saturating_sub(1) as u32
    }

    /// `A5:C{n}` for `count` entries.
    pub fn entry_rows(&self, count: usize) -> CellRange {
        CellRange::bounded(Self::TIMESTAMP_COL, self.body_start_row, Self::ARTIST_COL, self.last_row(count))
    }

    /// `D5:D{n}` for `count` entries.
    pub fn link_rows(&self, count: usize) -> CellRange {
        CellRange::bounded(Self::LINK_COL, self.body_start_row, Self::LINK_COL, self.last_row(count))
    }
}

/// Everything the writer needs besides the entries themselves.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub layout: RecordLayout,
    pub no_history_label: String,
    pub link_style: LinkStyle,
}

/// What happened to the link column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Nothing to link (sentinel state).
    Skipped,
    Written(usize),
    /// The store refused the write; rows are still committed.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub rows_written: usize,
    pub sentinel: bool,
    pub links: LinkOutcome,
}

pub fn format_audit_timestamp(now: &DateTime<Tz>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Stamp the last-run cell. Runs first on every pass, whatever happens after.
pub fn record_last_run(
    store: &mut dyn RecordStore,
    layout: &RecordLayout,
    now: &DateTime<Tz>,
) -> Result<(), StoreError> {
    log::info!("Updating last run time in {}", layout.last_run_cell);
    store.write_range(
        &layout.last_run_cell,
        &[vec![format_audit_timestamp(now)]],
        WriteMode::Raw,
    )
}

/// Search URL for an entry's "title artist".
pub fn search_url(entry: &Entry) -> String {
    let query = format!("{} {}", entry.title(), entry.artist());
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("search_query", query.trim())
        .finish();
    format!("{SEARCH_URL}?{encoded}")
}

/// Cell value and write mode for one link.
pub fn link_cell(entry: &Entry, style: LinkStyle) -> (String, WriteMode) {
    let url = search_url(entry);
    match style {
        LinkStyle::RawUrl => (url, WriteMode::Raw),
        LinkStyle::Hyperlink => (
            format!("=HYPERLINK(\"{url}\", \"{LINK_LABEL}\")"),
            WriteMode::UserEntered,
        ),
    }
}

/// Write entries as (timestamp, title, artist) rows. Returns the row count.
pub fn write_rows(
    store: &mut dyn RecordStore,
    layout: &RecordLayout,
    entries: &[Entry],
) -> Result<usize, StoreError> {
    let range = layout.entry_rows(entries.len());
    let rows: Vec<Vec<String>> = entries.iter().map(Entry::to_row).collect();
    log::info!("Writing {} entries to {range}", rows.len());
    log::debug!("Entries: {rows:?}");
    store.write_range(&range, &rows, WriteMode::Raw)?;
    Ok(rows.len())
}

/// Write one search link per entry into the link column.
pub fn write_links(
    store: &mut dyn RecordStore,
    layout: &RecordLayout,
    entries: &[Entry],
    style: LinkStyle,
) -> Result<usize, StoreError> {
    let range = layout.link_rows(entries.len());
    let mut mode = WriteMode::Raw;
    let mut links: Vec<Vec<String>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let (value, cell_mode) = link_cell(entry, style);
        mode = cell_mode;
        links.push(vec![value]);
    }
    log::info!("Writing {} links to {range}", links.len());
    log::debug!("Links: {links:?}");
    store.write_range(&range, &links, mode)?;
    Ok(links.len())
}

/// Write the "no history" placeholder row.
pub fn write_sentinel(
    store: &mut dyn RecordStore,
    settings: &PublishSettings,
    now: &DateTime<Tz>,
) -> Result<(), StoreError> {
    let range = settings.layout.sentinel_row();
    log::info!("No entries to write. Writing {} to {range}", settings.no_history_label);
    store.write_range(
        &range,
        &[vec![format_audit_timestamp(now), settings.no_history_label.clone()]],
        WriteMode::Raw,
    )
}

/// Replace the record body with `entries`, or with the sentinel row when
/// there are none.
///
/// Rows and links are committed separately. A failed link write is logged and
/// reported in [`PublishOutcome::links`]; any other store error propagates.
pub fn publish(
    store: &mut dyn RecordStore,
    settings: &PublishSettings,
    entries: &[Entry],
    now: &DateTime<Tz>,
) -> Result<PublishOutcome, StoreError> {
    let body = settings.layout.body();
    log::info!("Clearing old entries in {body}");
    store.clear_range(&body)?;

    if entries.is_empty() {
        write_sentinel(store, settings, now)?;
        return Ok(PublishOutcome {
            rows_written: 0,
            sentinel: true,
            links: LinkOutcome::Skipped,
        });
    }

    let rows_written = write_rows(store, &settings.layout, entries)?;

    let links = match write_links(store, &settings.layout, entries, settings.link_style) {
        Ok(n) => LinkOutcome::Written(n),
        Err(e) => {
            log::warn!("Skipping search links, the record refused them: {e}");
            LinkOutcome::Rejected(e.to_string())
        }
    };

    Ok(PublishOutcome {
        rows_written,
        sentinel: false,
        links,
    })
}
