pub mod sqlite;

pub use sqlite::SqliteStore;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid range {range}: {reason}")]
    InvalidRange { range: String, reason: String },
    #[error("Write to {range} rejected: {reason}")]
    Rejected { range: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// How written values are interpreted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Stored exactly as given.
    Raw,
    /// Interpreted as if typed by a user, so `=`-prefixed values become formulas.
    UserEntered,
}

/// Read/write primitives of the published record.
///
/// Ranges use A1 notation; see [`CellRange`]. Reads follow spreadsheet
/// semantics: rows run up to the last non-empty row in the range, trailing
/// empty cells are dropped, and blank rows in between come back empty.
pub trait RecordStore {
    fn clear_range(&mut self, range: &CellRange) -> Result<()>;
    fn read_range(&mut self, range: &CellRange) -> Result<Vec<Vec<String>>>;
    fn write_range(&mut self, range: &CellRange, rows: &[Vec<String>], mode: WriteMode) -> Result<()>;
}

/// A rectangular block of cells. Columns and rows are 1-based; an open
/// `end_row` extends to the bottom of the sheet (`A5:D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    pub end_row: Option<u32>,
}

impl CellRange {
    /// A single cell, e.g. `A1`.
    pub fn cell(col: u32, row: u32) -> Self {
        Self { start_col: col, start_row: row, end_col: col, end_row: Some(row) }
    }

    /// Every row from `start_row` down, e.g. `A5:D`.
    pub fn open(start_col: u32, start_row: u32, end_col: u32) -> Self {
        Self { start_col, start_row, end_col, end_row: None }
    }

    pub fn bounded(start_col: u32, start_row: u32, end_col: u32, end_row: u32) -> Self {
        Self { start_col, start_row, end_col, end_row: Some(end_row) }
    }

    pub fn width(&self) -> u32 {
        self.end_col - self.start_col + 1
    }

    /// Number of rows, or `None` for an open range.
    pub fn height(&self) -> Option<u32> {
        self.end_row.map(|end| end - self.start_row + 1)
    }

    fn validate(self) -> std::result::Result<Self, String> {
        if self.start_col == 0 || self.start_row == 0 {
            return Err("rows and columns start at 1".to_string());
        }
        if self.end_col < self.start_col {
            return Err("end column precedes start column".to_string());
        }
        if matches!(self.end_row, Some(end) if end < self.start_row) {
            return Err("end row precedes start row".to_string());
        }
        Ok(self)
    }
}

/// Column number to letters: 1 -> `A`, 26 -> `Z`, 27 -> `AA`.
pub fn column_letters(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Column letters to number: `A` -> 1, `AA` -> 27. Case-insensitive.
pub fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Split `D12` into (`D`, Some(12)) or `D` into (`D`, None).
fn split_ref(part: &str) -> Option<(u32, Option<u32>)> {
    let digits_at = part.find(|c: char| c.is_ascii_digit()).unwrap_or(part.len());
    let (letters, digits) = part.split_at(digits_at);
    let col = column_number(letters)?;
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse::<u32>().ok()?)
    };
    Some((col, row))
}

impl FromStr for CellRange {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| StoreError::InvalidRange {
            range: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (start, end) = match trimmed.split_once(':') {
            Some((a, b)) => (a, Some(b)),
            None => (trimmed, None),
        };

        let (start_col, start_row) = split_ref(start).ok_or_else(|| invalid("malformed start"))?;
        let start_row = start_row.ok_or_else(|| invalid("start needs a row"))?;

        let range = match end {
            None => CellRange::cell(start_col, start_row),
            Some(end) => {
                let (end_col, end_row) = split_ref(end).ok_or_else(|| invalid("malformed end"))?;
                CellRange { start_col, start_row, end_col, end_row }
            }
        };
        range.validate().map_err(|reason| invalid(reason.as_str()))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = format!("{}{}", column_letters(self.start_col), self.start_row);
        if self.end_row == Some(self.start_row) && self.end_col == self.start_col {
            return write!(f, "{start}");
        }
        let end_row = self.end_row.map(|r| r.to_string()).unwrap_or_default();
        write!(f, "{start}:{}{end_row}", column_letters(self.end_col))
    }
}
