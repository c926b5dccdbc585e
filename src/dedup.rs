use std::collections::HashSet;

use crate::entry::{normalize, Entry};

/// Separator between normalized fields in a dedupe key.
const KEY_SEPARATOR: &str = "||";

/// Identity of a play: trimmed, lowercased fields joined in column order.
/// Two entries that differ only by case or surrounding whitespace collide.
pub fn dedup_key(entry: &Entry) -> String {
    [entry.timestamp(), entry.title(), entry.artist()]
        .into_iter()
        .map(|field| normalize(Some(field)).to_lowercase())
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

pub fn dedup_key_set<'a, I>(entries: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries.into_iter().map(dedup_key).collect()
}
