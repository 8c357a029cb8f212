// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only SQLite log of classified QR records.
//
// Schema:
//   qr_results(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     file_name     TEXT    NOT NULL,   -- session id of the run
//     page_number   INTEGER NOT NULL,   -- 1-indexed
//     qr_value      TEXT,               -- normalized payload, NULL unless decoded
//     status        TEXT    NOT NULL,   -- VALID | INVALID | UNREADABLE | DUPLICATE
//     image_base64  TEXT,               -- data URI, NULL on internal failure
//     created_at    TEXT    NOT NULL    -- RFC 3339, UTC, microsecond precision
//   )
//
// Rows are only ever inserted. History is aggregated on demand.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::RecordStore;
use qrscan_core::types::{HistorySummary, QrRecord, QrStatus, SessionId};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS qr_results (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name     TEXT    NOT NULL,
        page_number   INTEGER NOT NULL,
        qr_value      TEXT,
        status        TEXT    NOT NULL,
        image_base64  TEXT,
        created_at    TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_qr_results_file ON qr_results (file_name);
"#;

const HISTORY_SQL: &str = r#"
    SELECT file_name,
           COUNT(*),
           MAX(created_at),
           SUM(CASE WHEN status = 'VALID' THEN 1 ELSE 0 END),
           SUM(CASE WHEN status = 'INVALID' THEN 1 ELSE 0 END),
           SUM(CASE WHEN status = 'UNREADABLE' THEN 1 ELSE 0 END),
           SUM(CASE WHEN status = 'DUPLICATE' THEN 1 ELSE 0 END)
    FROM qr_results
    GROUP BY file_name
    ORDER BY MAX(created_at) DESC, file_name ASC
"#;

/// Convert a `rusqlite::Error` into a `QrScanError::Database`.
fn db_err(e: rusqlite::Error) -> QrScanError {
    QrScanError::Database(e.to_string())
}

/// Fixed-width timestamps so `MAX(created_at)` orders chronologically.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Record store backed by a SQLite database.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so the connection sits
/// behind a mutex and the store can be shared across workers as
/// `Arc<QrStore>`.
pub struct QrStore {
    conn: Mutex<Connection>,
}

impl QrStore {
    /// Open (or create) the record database at `path`.
    ///
    /// Enables WAL so readers (history queries) do not block the writing run.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| QrScanError::Database(format!("WAL pragma: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| QrScanError::Database(format!("create table: {e}")))?;

        info!("record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| QrScanError::Database(format!("create table: {e}")))?;

        debug!("in-memory record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert one record. Returns the row id.
    #[instrument(skip(self, record), fields(file = %record.file_name, page = record.page_number, status = %record.status))]
    pub fn insert(&self, record: &QrRecord) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO qr_results (file_name, page_number, qr_value, status, image_base64, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.file_name.as_str(),
                record.page_number,
                record.value,
                record.status.as_str(),
                record.image_data_uri,
                format_timestamp(&record.created_at),
            ],
        )
        .map_err(|e| QrScanError::Database(format!("insert record: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, "record inserted");
        Ok(id)
    }

    /// A writer that panicked mid-statement leaves no open transaction, so
    /// the connection stays usable and poison is ignored.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for QrStore {
    fn append(&self, record: &QrRecord) -> Result<()> {
        self.insert(record).map(|_| ())
    }

    /// Every record stored under `file_name`, in insertion order.
    fn records_for_file(&self, file_name: &str) -> Result<Vec<QrRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT file_name, page_number, qr_value, status, image_base64, created_at
                 FROM qr_results
                 WHERE file_name = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let records = stmt
            .query_map(params![file_name], row_to_record)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        debug!(file_name, count = records.len(), "records retrieved");
        Ok(records)
    }

    /// Per-file aggregates, most recently processed first.
    fn history(&self) -> Result<Vec<HistorySummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(HISTORY_SQL).map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                let processed_at: String = row.get(2)?;
                Ok(HistorySummary {
                    file_name: SessionId(row.get(0)?),
                    qr_count: row.get::<_, i64>(1)? as u64,
                    processed_at: parse_timestamp(2, &processed_at)?,
                    valid_count: row.get::<_, i64>(3)? as u64,
                    invalid_count: row.get::<_, i64>(4)? as u64,
                    unreadable_count: row.get::<_, i64>(5)? as u64,
                    duplicate_count: row.get::<_, i64>(6)? as u64,
                })
            })
            .map_err(db_err)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row.map_err(db_err)?);
        }
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column indices must match the SELECT order in `records_for_file`.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<QrRecord> {
    let file_name: String = row.get(0)?;
    let page_number: u32 = row.get(1)?;
    let value: Option<String> = row.get(2)?;
    let status_str: String = row.get(3)?;
    let image_data_uri: Option<String> = row.get(4)?;
    let created_at_str: String = row.get(5)?;

    let status = QrStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown status {status_str:?}").into(),
        )
    })?;

    Ok(QrRecord {
        file_name: SessionId(file_name),
        page_number,
        value,
        status,
        image_data_uri,
        created_at: parse_timestamp(5, &created_at_str)?,
    })
}
