use crate::entry::Entry;
use crate::publish::RecordLayout;
use crate::store::{RecordStore, StoreError};

/// Load the entries currently published in the record body.
///
/// Blank rows, the "no history" placeholder and rows with an unparseable
/// timestamp are dropped. Short rows are padded.
pub fn read_existing(
    store: &mut dyn RecordStore,
    layout: &RecordLayout,
    no_history_label: &str,
) -> Result<Vec<Entry>, StoreError> {
    let range = layout.entry_columns();
    let rows = store.read_range(&range)?;
    log::debug!("Read {} raw rows from {range}", rows.len());

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let entry = Entry::from_row(&row);
        if entry.title() == no_history_label {
            continue;
        }
        if entry.parsed_timestamp().is_none() {
            log::debug!("Dropping row with bad timestamp: {row:?}");
            continue;
        }
        entries.push(entry);
    }

    log::info!("Found {} existing entries", entries.len());
    Ok(entries)
}
