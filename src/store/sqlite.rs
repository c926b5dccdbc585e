use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

use super::{CellRange, RecordStore, Result, StoreError, WriteMode};

/// Published record kept in SQLite, one cell per row of `cells`.
///
/// Several records can share a database file; each store handle is bound to
/// one `record_id` and fails with [`StoreError::RecordNotFound`] until that
/// record has been created.
pub struct SqliteStore {
    pub conn: Connection,
    record_id: String,
    accept_formulas: bool,
}

impl SqliteStore {
    pub fn open(path: &Path, record_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, record_id)
    }

    pub fn open_in_memory(record_id: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, record_id)
    }

    fn with_connection(conn: Connection, record_id: &str) -> Result<Self> {
        let store = Self {
            conn,
            record_id: record_id.to_string(),
            accept_formulas: true,
        };
        store.init()?;
        Ok(store)
    }

    /// Refuse user-entered formula writes, the way a locked-down sheet does.
    pub fn accept_formulas(mut self, accept: bool) -> Self {
        self.accept_formulas = accept;
        self
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", 1)?;
        Ok(())
    }

    /// V1: records + cells
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                record_id   TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS cells (
                record_id   TEXT NOT NULL REFERENCES records(record_id) ON DELETE CASCADE,
                row         INTEGER NOT NULL,
                col         INTEGER NOT NULL,
                value       TEXT NOT NULL,
                is_formula  INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (record_id, row, col)
            );
            ",
        )?;
        Ok(())
    }

    /// Create the bound record if missing. Returns true when it was created.
    pub fn create_record(&self) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records (record_id) VALUES (?1)",
            params![self.record_id],
        )?;
        if inserted > 0 {
            log::info!("Created record {}", self.record_id);
        }
        Ok(inserted > 0)
    }

    fn ensure_record(&self) -> Result<()> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT record_id FROM records WHERE record_id = ?1",
                params![self.record_id],
                |row| row.get(0),
            )
            .optional()?;
        match found {
            Some(_) => Ok(()),
            None => Err(StoreError::RecordNotFound(self.record_id.clone())),
        }
    }

    /// Whether the cell at (col, row) holds a formula.
    pub fn is_formula(&self, col: u32, row: u32) -> Result<bool> {
        let flag: Option<bool> = self
            .conn
            .query_row(
                "SELECT is_formula FROM cells WHERE record_id = ?1 AND row = ?2 AND col = ?3",
                params![self.record_id, row, col],
                |r| r.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }
}

impl RecordStore for SqliteStore {
    fn clear_range(&mut self, range: &CellRange) -> Result<()> {
        self.ensure_record()?;
        let cleared = self.conn.execute(
            "DELETE FROM cells
             WHERE record_id = ?1
               AND col BETWEEN ?2 AND ?3
               AND row >= ?4
               AND (?5 IS NULL OR row <= ?5)",
            params![
                self.record_id,
                range.start_col,
                range.end_col,
                range.start_row,
                range.end_row,
            ],
        )?;
        log::debug!("Cleared {cleared} cells in {range}");
        Ok(())
    }

    fn read_range(&mut self, range: &CellRange) -> Result<Vec<Vec<String>>> {
        self.ensure_record()?;
        let mut stmt = self.conn.prepare(
            "SELECT row, col, value FROM cells
             WHERE record_id = ?1
               AND col BETWEEN ?2 AND ?3
               AND row >= ?4
               AND (?5 IS NULL OR row <= ?5)
             ORDER BY row, col",
        )?;

        let mut by_row: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
        let cells = stmt.query_map(
            params![
                self.record_id,
                range.start_col,
                range.end_col,
                range.start_row,
                range.end_row,
            ],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?, row.get::<_, String>(2)?)),
        )?;
        for cell in cells {
            let (row, col, value) = cell?;
            by_row.entry(row).or_default().insert(col, value);
        }

        let Some(&last_row) = by_row.keys().next_back() else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::with_capacity((last_row - range.start_row + 1) as usize);
        for row in range.start_row..=last_row {
            let Some(cols) = by_row.get(&row) else {
                rows.push(Vec::new());
                continue;
            };
            let last_col = cols.keys().next_back().copied().unwrap_or(range.start_col);
            let values = (range.start_col..=last_col)
                .map(|col| cols.get(&col).cloned().unwrap_or_default())
                .collect();
            rows.push(values);
        }
        Ok(rows)
    }

    fn write_range(&mut self, range: &CellRange, rows: &[Vec<String>], mode: WriteMode) -> Result<()> {
        self.ensure_record()?;

        let too_tall = range.height().is_some_and(|h| rows.len() > h as usize);
        let too_wide = rows.iter().any(|r| r.len() > range.width() as usize);
        if too_tall || too_wide {
            return Err(StoreError::InvalidRange {
                range: range.to_string(),
                reason: format!("{} rows do not fit", rows.len()),
            });
        }

        let formulas = mode == WriteMode::UserEntered;
        if formulas && !self.accept_formulas {
            let has_formula = rows.iter().flatten().any(|v| v.starts_with('='));
            if has_formula {
                return Err(StoreError::Rejected {
                    range: range.to_string(),
                    reason: "formula values are not accepted by this record".to_string(),
                });
            }
        }

        let tx = self.conn.transaction()?;
        for (r, values) in rows.iter().enumerate() {
            let row = range.start_row + r as u32;
            for (c, value) in values.iter().enumerate() {
                let col = range.start_col + c as u32;
                if value.is_empty() {
                    tx.execute(
                        "DELETE FROM cells WHERE record_id = ?1 AND row = ?2 AND col = ?3",
                        params![self.record_id, row, col],
                    )?;
                    continue;
                }
                tx.execute(
                    "INSERT INTO cells (record_id, row, col, value, is_formula, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                     ON CONFLICT(record_id, row, col) DO UPDATE SET
                        value = excluded.value,
                        is_formula = excluded.is_formula,
                        updated_at = datetime('now')",
                    params![self.record_id, row, col, value, formulas && value.starts_with('=')],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
