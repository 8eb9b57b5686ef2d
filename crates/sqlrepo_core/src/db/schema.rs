//! Entity table creation and inspection.
//!
//! # Responsibility
//! - Create entity tables from their descriptors.
//! - Add descriptor columns missing from existing tables.
//! - Answer readiness questions for repository construction.
//!
//! # Invariants
//! - Migration never drops or rewrites existing columns.
//! - Applying the same descriptor twice is a no-op.

use super::{with_savepoint, DbResult};
use crate::model::entity::{check_descriptor, Entity};
use log::{error, info};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::time::Instant;

/// Creates or extends the table backing `E`.
///
/// New tables get an autoincrement `id`, the backend timestamps and an index
/// on `deleted_at`. Existing tables only receive missing descriptor columns.
pub fn auto_migrate<E: Entity>(conn: &Connection) -> DbResult<()> {
    let started_at = Instant::now();
    check_descriptor::<E>()?;

    let result = with_savepoint(conn, "sqlrepo_auto_migrate", || -> DbResult<usize> {
        if !table_exists(conn, E::TABLE)? {
            conn.execute_batch(&create_table_sql::<E>())?;
            return Ok(E::COLUMNS.len());
        }

        let existing = table_columns(conn, E::TABLE)?;
        let mut added = 0;
        for column in E::COLUMNS {
            if existing.contains(column.name) {
                continue;
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                E::TABLE,
                column.name,
                column.sql_type
            ))?;
            added += 1;
        }
        Ok(added)
    });

    match result {
        Ok(columns) => {
            info!(
                "event=schema_migrate module=db status=ok table={} columns_applied={} duration_ms={}",
                E::TABLE,
                columns,
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Err(err) => {
            error!(
                "event=schema_migrate module=db status=error table={} duration_ms={} error={}",
                E::TABLE,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Returns whether `table` exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Returns the column names of `table` (empty when the table is missing).
pub fn table_columns(conn: &Connection, table: &str) -> DbResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn create_table_sql<E: Entity>() -> String {
    let mut sql = format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER",
        table = E::TABLE
    );
    for column in E::COLUMNS {
        sql.push_str(&format!(",\n            {} {}", column.name, column.sql_type));
    }
    sql.push_str(&format!(
        "\n        );
        CREATE INDEX idx_{table}_deleted_at ON {table} (deleted_at);",
        table = E::TABLE
    ));
    sql
}
