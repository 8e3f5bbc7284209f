#![forbid(unsafe_code)]

mod access;
mod cards;
mod collaboration;
mod content;
mod error;
mod records;
mod schema;
mod stories;
mod tags;
mod timeline;

pub use error::StoreError;
pub use records::*;

use crate::config::StoreConfig;
use loom_core::failure::FailureKind;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior, params};
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(StoreConfig::for_dir(storage_dir))
    }

    pub fn open_with_config(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let db_path = config.db_path();
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if config.journal_mode_wal {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn, now_ms())?;

        tracing::debug!(db_path = %db_path.display(), "store opened");
        Ok(Self { conn, config })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.db_path()
    }

    /// Runs `body` in one immediate (write-locking) transaction and reports the outcome.
    fn write<T>(
        &mut self,
        op: &'static str,
        body: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = (|| -> Result<T, StoreError> {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = body(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        report(op, result)
    }

    /// Runs `body` against one read snapshot.
    fn read<T>(
        &self,
        op: &'static str,
        body: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = (|| -> Result<T, StoreError> {
            let tx = self.conn.unchecked_transaction()?;
            let value = body(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        report(op, result)
    }
}

fn report<T>(op: &'static str, result: Result<T, StoreError>) -> Result<T, StoreError> {
    if let Err(err) = &result {
        match err.kind() {
            FailureKind::Internal => {
                tracing::error!(op, code = err.code(), error = %err, "store operation failed");
            }
            kind => {
                tracing::debug!(op, code = kind.code(), error = %err, "store operation rejected");
            }
        }
    }
    result
}

/// Allocates the next sequential record id for `prefix` inside `tx`.
fn next_id_tx(tx: &Transaction<'_>, prefix: &str) -> Result<String, StoreError> {
    let value: i64 = tx.query_row(
        r#"
        INSERT INTO counters(name, value) VALUES (?1, 1)
        ON CONFLICT(name) DO UPDATE SET value=value + 1
        RETURNING value
        "#,
        params![prefix],
        |row| row.get(0),
    )?;
    Ok(format!("{prefix}-{value:06}"))
}

fn map_insert_conflict(err: rusqlite::Error, what: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::Conflict(what);
    }
    StoreError::Sql(err)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                && message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn corrupt<E: Display>(column: &'static str) -> impl FnOnce(E) -> StoreError {
    move |err| StoreError::CorruptRow(format!("{column}: {err}"))
}

fn tags_to_json(tags: &std::collections::BTreeSet<String>) -> Result<String, StoreError> {
    Ok(serde_json::to_string(tags)?)
}

fn tags_from_json(raw: &str) -> Result<std::collections::BTreeSet<String>, StoreError> {
    serde_json::from_str(raw).map_err(corrupt("tags_json"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
