//! Durable answer storage.
//!
//! First write wins: the `(device_id, question_id)` composite primary key is
//! the sole deduplication mechanism. There is no update path and no
//! check-then-insert; a uniqueness violation surfaces as
//! [`InsertOutcome::DuplicateRejected`], which is an expected condition under
//! retransmission, not an error.

use crate::answer::{Answer, Choice};
use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Database(rusqlite::Error),
    /// A stored row no longer fits the answer domain.
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::Corrupt(detail) => write!(f, "corrupt row: {}", detail),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of attempting to persist one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row is durable; this was the device's first answer to the question.
    Committed,
    /// The device already answered this question; the stored row is unchanged.
    DuplicateRejected,
}

/// Keyed durable store for answers.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn insert(&self, answer: &Answer) -> Result<InsertOutcome, StoreError>;

    /// Administrative bulk purge; returns the number of rows removed.
    async fn delete_all(&self) -> Result<usize, StoreError>;

    /// Full replay in insertion order, for rehydrating in-memory statistics.
    async fn scan_all(&self) -> Result<Vec<Answer>, StoreError>;
}

/// SQLite-backed [`AnswerStore`].
pub struct SqliteAnswerStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS answers (
    device_id   TEXT NOT NULL,
    question_id TEXT NOT NULL,
    choice      INTEGER NOT NULL CHECK (choice BETWEEN 0 AND 3),
    received_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (device_id, question_id)
)";

impl SqliteAnswerStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Private in-memory database, used by tests and `:memory:` deployments.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        apply_pragmas(&conn)?;
        conn.execute(SCHEMA, [])?;
        log::info!("✅ Answer store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// WAL keeps readers (leaderboard queries) from blocking the ingestion writes.
fn apply_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    Ok(())
}

#[async_trait]
impl AnswerStore for SqliteAnswerStore {
    async fn insert(&self, answer: &Answer) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO answers (device_id, question_id, choice) VALUES (?1, ?2, ?3)",
            params![answer.device_id, answer.question_id, answer.choice.index()],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Committed),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Ok(InsertOutcome::DuplicateRejected)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM answers", [])?;
        Ok(removed)
    }

    async fn scan_all(&self) -> Result<Vec<Answer>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT device_id, question_id, choice, received_at FROM answers ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut answers = Vec::new();
        for row in rows {
            let (device_id, question_id, raw_choice, received_at) = row?;
            let choice = u8::try_from(raw_choice)
                .ok()
                .and_then(|value| Choice::new(value).ok())
                .ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "choice {} for ({}, {:?}) is outside the answer domain",
                        raw_choice, device_id, question_id
                    ))
                })?;
            let received_at = DateTime::from_timestamp(received_at, 0).ok_or_else(|| {
                StoreError::Corrupt(format!("unreadable timestamp {}", received_at))
            })?;
            answers.push(Answer {
                device_id,
                question_id,
                choice,
                received_at: Some(received_at),
            });
        }
        Ok(answers)
    }
}
