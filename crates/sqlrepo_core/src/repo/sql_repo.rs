//! SQLite implementation of the repository contract.
//!
//! # Responsibility
//! - Translate each contract operation into one statement (or a read plus a
//!   write) against a borrowed connection.
//! - Map empty reads and zero-row writes onto `NotFound`.
//!
//! # Invariants
//! - Every query filters out soft-deleted rows.
//! - `remove`/`remove_bulk` read before they write, so callers get the state
//!   from just before deletion.
//! - `update_bulk` re-reads its rows instead of trusting the write result.
//!   The re-read is not guarded against concurrent writers on other
//!   connections.
//! - The context is re-checked before every statement after the first, and
//!   before each row of `create_bulk`.

use crate::context::ExecContext;
use crate::db::schema::{table_columns, table_exists};
use crate::db::{with_savepoint, DbError};
use crate::model::entity::{
    check_descriptor, entity_values, is_zero_value, Entity, EntityId, Record, RESERVED_COLUMNS,
};
use crate::repo::repository::{RepoError, RepoResult, Repository};
use log::{debug, log, Level};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, Row, Statement};
use std::marker::PhantomData;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const RECORD_SELECT_COLUMNS: &str = "id, created_at, updated_at, deleted_at";

/// SQLite-backed repository for entity type `E`.
///
/// Borrows a connection; pass a `rusqlite::Transaction` (through deref) to
/// run every operation inside that transaction.
///
/// Each operation installs its own SQLite progress handler to watch the
/// `ExecContext` and clears it on return. A progress handler the caller set
/// on the same connection is replaced and not restored.
pub struct SqlRepository<'conn, E> {
    conn: &'conn Connection,
    select_sql: String,
    insert_sql: String,
    _entity: PhantomData<fn() -> E>,
}

impl<'conn, E: Entity> SqlRepository<'conn, E> {
    /// Constructs a repository on a connection whose schema already holds
    /// the table for `E` (see `db::schema::auto_migrate`).
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        check_descriptor::<E>()?;
        ensure_connection_ready::<E>(conn)?;
        Ok(Self {
            conn,
            select_sql: select_sql::<E>(),
            insert_sql: insert_sql::<E>(),
            _entity: PhantomData,
        })
    }

    /// Returns the connection this repository is bound to.
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn run<T>(
        &self,
        ctx: &ExecContext,
        op: &'static str,
        body: impl FnOnce() -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let result = match ctx.check() {
            Err(err) => Err(err.into()),
            Ok(()) => {
                let _guard = ctx.bind(self.conn);
                body().map_err(|err| context_interrupt(ctx, err))
            }
        };

        let elapsed = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => debug!(
                "event=repo_op module=repo op={op} table={} status=ok duration_ms={elapsed}",
                E::TABLE
            ),
            Err(err) => {
                let level = match err {
                    RepoError::NotFound { .. } | RepoError::Validation(_) => Level::Debug,
                    RepoError::Cancelled | RepoError::DeadlineExceeded => Level::Warn,
                    _ => Level::Error,
                };
                log!(
                    level,
                    "event=repo_op module=repo op={op} table={} status={} duration_ms={elapsed} error={err}",
                    E::TABLE,
                    err.status()
                );
            }
        }
        result
    }

    fn select_one(&self, id: EntityId) -> RepoResult<E> {
        let sql = format!("{} WHERE id = ?1 AND deleted_at IS NULL;", self.select_sql);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id_value(id)?])?;
        match rows.next()? {
            Some(row) => parse_entity_row(row),
            None => Err(RepoError::NotFound { table: E::TABLE, id }),
        }
    }

    fn select_many(&self, ids: &[EntityId]) -> RepoResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} WHERE id IN ({}) AND deleted_at IS NULL ORDER BY id ASC;",
            self.select_sql,
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(id_values(ids)?))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }
        Ok(entities)
    }

    /// Applies the non-zero `values` to live rows in `ids`; returns affected rows.
    fn update_rows(&self, ids: &[EntityId], values: Vec<Value>, now: i64) -> RepoResult<usize> {
        let mut assignments = Vec::new();
        let mut bind_values = Vec::new();
        for (column, value) in E::COLUMNS.iter().zip(values) {
            if is_zero_value(&value) {
                continue;
            }
            assignments.push(format!("{} = ?", column.name));
            bind_values.push(value);
        }
        assignments.push("updated_at = ?".to_string());
        bind_values.push(Value::Integer(now));
        bind_values.extend(id_values(ids)?);

        let sql = format!(
            "UPDATE {} SET {} WHERE id IN ({}) AND deleted_at IS NULL;",
            E::TABLE,
            assignments.join(", "),
            placeholders(ids.len())
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn soft_delete_rows(&self, ids: &[EntityId], now: i64) -> RepoResult<usize> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE id IN ({}) AND deleted_at IS NULL;",
            E::TABLE,
            placeholders(ids.len())
        );
        let mut bind_values = vec![Value::Integer(now)];
        bind_values.extend(id_values(ids)?);
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }
}

impl<E: Entity> Repository<E> for SqlRepository<'_, E> {
    fn create(&self, ctx: &ExecContext, mut entity: E) -> RepoResult<E> {
        self.run(ctx, "create", || {
            entity.validate()?;
            let values = entity_values(&entity)?;
            let now = now_epoch_ms();
            let mut stmt = self.conn.prepare(&self.insert_sql)?;
            *entity.record_mut() = insert_row(&mut stmt, values, now)?;
            Ok(entity)
        })
    }

    fn create_bulk(&self, ctx: &ExecContext, entities: Vec<E>) -> RepoResult<Vec<E>> {
        self.run(ctx, "create_bulk", || {
            if entities.is_empty() {
                return Ok(Vec::new());
            }

            let mut rows = Vec::with_capacity(entities.len());
            for entity in &entities {
                entity.validate()?;
                rows.push(entity_values(entity)?);
            }

            with_savepoint(self.conn, "sqlrepo_create_bulk", || -> RepoResult<Vec<E>> {
                let now = now_epoch_ms();
                let mut stmt = self.conn.prepare(&self.insert_sql)?;
                let mut created = Vec::with_capacity(entities.len());
                for (mut entity, values) in entities.into_iter().zip(rows) {
                    ctx.check()?;
                    *entity.record_mut() = insert_row(&mut stmt, values, now)?;
                    created.push(entity);
                }
                Ok(created)
            })
        })
    }

    fn get(&self, ctx: &ExecContext, id: EntityId) -> RepoResult<E> {
        self.run(ctx, "get", || self.select_one(id))
    }

    fn find(&self, ctx: &ExecContext, ids: &[EntityId]) -> RepoResult<Vec<E>> {
        self.run(ctx, "find", || self.select_many(ids))
    }

    fn update(&self, ctx: &ExecContext, id: EntityId, entity: &E) -> RepoResult<E> {
        self.run(ctx, "update", || {
            entity.validate()?;
            let values = entity_values(entity)?;
            let changed = self.update_rows(&[id], values, now_epoch_ms())?;
            if changed == 0 {
                return Err(RepoError::NotFound { table: E::TABLE, id });
            }
            ctx.check()?;
            self.select_one(id)
        })
    }

    fn update_bulk(
        &self,
        ctx: &ExecContext,
        ids: &[EntityId],
        entity: &E,
    ) -> RepoResult<Vec<E>> {
        self.run(ctx, "update_bulk", || {
            entity.validate()?;
            let values = entity_values(entity)?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            self.update_rows(ids, values, now_epoch_ms())?;
            ctx.check()?;
            self.select_many(ids)
        })
    }

    fn remove(&self, ctx: &ExecContext, id: EntityId) -> RepoResult<E> {
        self.run(ctx, "remove", || {
            let mut entity = self.select_one(id)?;
            ctx.check()?;
            let now = now_epoch_ms();
            self.soft_delete_rows(&[id], now)?;
            entity.record_mut().deleted_at = Some(now);
            Ok(entity)
        })
    }

    fn remove_bulk(&self, ctx: &ExecContext, ids: &[EntityId]) -> RepoResult<Vec<E>> {
        self.run(ctx, "remove_bulk", || {
            let mut entities = self.select_many(ids)?;
            if entities.is_empty() {
                return Ok(entities);
            }

            ctx.check()?;
            let now = now_epoch_ms();
            self.soft_delete_rows(ids, now)?;
            for entity in &mut entities {
                entity.record_mut().deleted_at = Some(now);
            }
            Ok(entities)
        })
    }
}

fn ensure_connection_ready<E: Entity>(conn: &Connection) -> RepoResult<()> {
    if !table_exists(conn, E::TABLE)? {
        return Err(RepoError::MissingRequiredTable(E::TABLE));
    }

    let columns = table_columns(conn, E::TABLE)?;
    let required = RESERVED_COLUMNS
        .iter()
        .copied()
        .chain(E::COLUMNS.iter().map(|column| column.name));
    for column in required {
        if !columns.contains(column) {
            return Err(RepoError::MissingRequiredColumn {
                table: E::TABLE,
                column,
            });
        }
    }

    Ok(())
}

/// Reports a statement interrupted by the progress handler as the context error.
fn context_interrupt(ctx: &ExecContext, err: RepoError) -> RepoError {
    let interrupted = match &err {
        RepoError::Db(DbError::Sqlite(sqlite_err)) => {
            sqlite_err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted)
        }
        _ => false,
    };
    match ctx.state() {
        Some(reason) if interrupted => reason.into(),
        _ => err,
    }
}

fn insert_row(stmt: &mut Statement<'_>, values: Vec<Value>, now: i64) -> RepoResult<Record> {
    let mut bind_values = Vec::with_capacity(values.len() + 2);
    bind_values.push(Value::Integer(now));
    bind_values.push(Value::Integer(now));
    bind_values.extend(values);

    let id: i64 = stmt.query_row(params_from_iter(bind_values), |row| row.get(0))?;
    Ok(Record {
        id: parse_id(id)?,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

fn parse_entity_row<E: Entity>(row: &Row<'_>) -> RepoResult<E> {
    let record = Record {
        id: parse_id(row.get("id")?)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    Ok(E::from_row(record, row)?)
}

fn select_sql<E: Entity>() -> String {
    let mut columns = RECORD_SELECT_COLUMNS.to_string();
    for column in E::COLUMNS {
        columns.push_str(", ");
        columns.push_str(column.name);
    }
    format!("SELECT {columns} FROM {}", E::TABLE)
}

fn insert_sql<E: Entity>() -> String {
    let mut columns = vec!["created_at", "updated_at"];
    columns.extend(E::COLUMNS.iter().map(|column| column.name));
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING id;",
        E::TABLE,
        columns.join(", "),
        placeholders(columns.len())
    )
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn id_value(id: EntityId) -> RepoResult<Value> {
    i64::try_from(id)
        .map(Value::Integer)
        .map_err(|_| RepoError::InvalidData(format!("id {id} exceeds SQLite integer range")))
}

fn id_values(ids: &[EntityId]) -> RepoResult<Vec<Value>> {
    ids.iter().copied().map(id_value).collect()
}

fn parse_id(value: i64) -> RepoResult<EntityId> {
    EntityId::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative id `{value}` in primary key")))
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
