use chrono::NaiveDateTime;

/// Fixed wall-clock format shared by entries, the sentinel row and the
/// last-run marker.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One played track: (timestamp, title, artist).
///
/// Fields are private so an entry can't change after construction; build a
/// new one instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    timestamp: String,
    title: String,
    artist: String,
}

impl Entry {
    pub fn new(
        timestamp: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Build an entry from a positional row of any length.
    pub fn from_row<S: AsRef<str>>(row: &[S]) -> Self {
        let [timestamp, title, artist] = coerce_to_triple(row);
        Self { timestamp, title, artist }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    /// The timestamp parsed under [`TIMESTAMP_FORMAT`], if it is well formed.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// The three fields in column order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.title.clone(),
            self.artist.clone(),
        ]
    }
}

/// Trim a cell value; absent values become the empty string.
pub fn normalize(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Pad or truncate a row to exactly `[timestamp, title, artist]`.
/// Values are kept verbatim, only the shape changes.
pub fn coerce_to_triple<S: AsRef<str>>(row: &[S]) -> [String; 3] {
    let cell = |i: usize| {
        row.get(i)
            .map(|s| s.as_ref().to_string())
            .unwrap_or_default()
    };
    [cell(0), cell(1), cell(2)]
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}
