//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by repositories.
//!
//! # Invariants
//! - Returned connections have `foreign_keys` set as configured.
//! - Returned connections have a non-zero busy timeout.

use super::{DbConfig, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file with default settings.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_config(&DbConfig::file(path.as_ref()))
}

/// Opens a private in-memory SQLite database with default settings.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db_with_config(&DbConfig::default())
}

/// Opens and configures a connection described by `config`.
///
/// # Side effects
/// - Creates the database file when it does not exist yet.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with_config(config: &DbConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = config.mode();
    info!("event=db_open module=db status=start mode={mode}");

    config.validate()?;

    let opened = match &config.path {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    };
    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection, config: &DbConfig) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}
