//! SQLite storage bootstrap and entity schema management.
//!
//! # Responsibility
//! - Open and configure SQLite connections for repositories.
//! - Create or extend entity tables from their descriptors.
//!
//! # Invariants
//! - Returned connections have the configured pragmas applied.
//! - Schema changes only ever add tables, columns and indexes.

use crate::model::entity::DescriptorError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory, open_db_with_config};

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidConfig(String),
    Descriptor(DescriptorError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidConfig(message) => write!(f, "invalid database config: {message}"),
            Self::Descriptor(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidConfig(_) => None,
            Self::Descriptor(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<DescriptorError> for DbError {
    fn from(value: DescriptorError) -> Self {
        Self::Descriptor(value)
    }
}

/// Runs `body` inside a named savepoint on `conn`.
///
/// Works on plain connections and inside open transactions. Any error rolls
/// back everything `body` wrote before it is returned.
pub(crate) fn with_savepoint<T, E>(
    conn: &Connection,
    name: &str,
    body: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match body() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            // Rollback failure is secondary; the body error is what the caller needs.
            let _ = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"));
            Err(err)
        }
    }
}

/// Connection settings.
///
/// Deserializable so host applications can embed it in their own config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Whether to enforce foreign key constraints.
    pub foreign_keys: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl DbConfig {
    /// Config for a file-backed database with default settings.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Rejects settings that cannot produce a usable connection.
    pub fn validate(&self) -> DbResult<()> {
        if self.busy_timeout_ms == 0 {
            return Err(DbError::InvalidConfig(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(DbError::InvalidConfig("path cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn mode(&self) -> &'static str {
        if self.path.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}
