#![forbid(unsafe_code)]

use crate::StoreError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_FILE: &str = "storyloom.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// How to open a [`crate::SqliteStore`].
///
/// ```toml
/// storage_dir = "/var/lib/storyloom"
/// db_file = "storyloom.db"
/// busy_timeout_ms = 5000
/// journal_mode_wal = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub storage_dir: PathBuf,
    #[serde(default = "default_db_file")]
    pub db_file: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub journal_mode_wal: bool,
}

impl StoreConfig {
    pub fn for_dir(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            db_file: default_db_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode_wal: true,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, StoreError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.db_file)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<(), StoreError> {
        let db_file = self.db_file.trim();
        if db_file.is_empty() {
            return Err(StoreError::InvalidInput("db_file must not be empty"));
        }
        if db_file.contains('/') || db_file.contains('\\') {
            return Err(StoreError::InvalidInput(
                "db_file must be a file name, not a path",
            ));
        }
        Ok(())
    }
}

fn default_db_file() -> String {
    DEFAULT_DB_FILE.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}
