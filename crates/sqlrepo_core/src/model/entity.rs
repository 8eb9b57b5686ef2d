//! Entity descriptor trait and embedded record fields.
//!
//! # Responsibility
//! - Let callers map their own structs onto one table each.
//! - Keep identity and timestamps under backend control.
//!
//! # Invariants
//! - `Record::id` is `0` until the backend assigns an id on insert.
//! - Caller columns never reuse a reserved column name.
//! - `Entity::to_values()` yields one value per `Entity::COLUMNS` entry, in order.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Backend-assigned row identifier.
pub type EntityId = u64;

/// Column names owned by the backend and present on every entity table.
pub const RESERVED_COLUMNS: &[&str] = &["id", "created_at", "updated_at", "deleted_at"];

/// Backend-managed fields embedded in every entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key, `0` for entities that were never persisted.
    pub id: EntityId,
    /// Insert time in epoch milliseconds.
    pub created_at: i64,
    /// Last write time in epoch milliseconds.
    pub updated_at: i64,
    /// Soft-delete marker in epoch milliseconds.
    pub deleted_at: Option<i64>,
}

impl Record {
    /// Returns whether the row has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// One caller-owned column of an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    /// SQLite column type including constraints, e.g. `TEXT NOT NULL DEFAULT ''`.
    pub sql_type: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type }
    }
}

/// Write-time validation failure reported by `Entity::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityValidationError {
    pub table: &'static str,
    pub message: String,
}

impl EntityValidationError {
    pub fn new(table: &'static str, message: impl Into<String>) -> Self {
        Self {
            table,
            message: message.into(),
        }
    }
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} entity: {}", self.table, self.message)
    }
}

impl Error for EntityValidationError {}

/// Reflection-free descriptor for a record type stored in one table.
///
/// Implementors embed a [`Record`] and list their own columns; the backend
/// owns `id`, `created_at`, `updated_at` and `deleted_at`.
///
/// ```ignore
/// struct Person {
///     record: Record,
///     first_name: String,
/// }
///
/// impl Entity for Person {
///     const TABLE: &'static str = "people";
///     const COLUMNS: &'static [Column] = &[Column::new("first_name", "TEXT NOT NULL DEFAULT ''")];
///
///     fn record(&self) -> &Record { &self.record }
///     fn record_mut(&mut self) -> &mut Record { &mut self.record }
///     fn to_values(&self) -> Vec<Value> { vec![Value::Text(self.first_name.clone())] }
///     fn from_row(record: Record, row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self { record, first_name: row.get("first_name")? })
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// Backing table name.
    const TABLE: &'static str;
    /// Caller-owned columns, in `to_values()` order.
    const COLUMNS: &'static [Column];

    fn record(&self) -> &Record;
    fn record_mut(&mut self) -> &mut Record;

    /// Column values in `COLUMNS` order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuilds an entity from a row selected with all `COLUMNS`.
    fn from_row(record: Record, row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Checks entity state before any write reaches the backend.
    fn validate(&self) -> Result<(), EntityValidationError> {
        Ok(())
    }
}

/// Problems found in an entity descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    EmptyTableName,
    ReservedColumn(&'static str),
    DuplicateColumn(&'static str),
    ValueCountMismatch { expected: usize, actual: usize },
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTableName => write!(f, "entity table name cannot be empty"),
            Self::ReservedColumn(name) => {
                write!(f, "column `{name}` is reserved for backend-managed fields")
            }
            Self::DuplicateColumn(name) => write!(f, "column `{name}` is declared twice"),
            Self::ValueCountMismatch { expected, actual } => write!(
                f,
                "entity produced {actual} column values, descriptor declares {expected}"
            ),
        }
    }
}

impl Error for DescriptorError {}

/// Checks the static descriptor of `E`.
pub fn check_descriptor<E: Entity>() -> Result<(), DescriptorError> {
    if E::TABLE.trim().is_empty() {
        return Err(DescriptorError::EmptyTableName);
    }

    let mut seen = BTreeSet::new();
    for column in E::COLUMNS {
        if RESERVED_COLUMNS.contains(&column.name) {
            return Err(DescriptorError::ReservedColumn(column.name));
        }
        if !seen.insert(column.name) {
            return Err(DescriptorError::DuplicateColumn(column.name));
        }
    }

    Ok(())
}

/// Returns the values of `entity`, rejecting a count that disagrees with `COLUMNS`.
pub fn entity_values<E: Entity>(entity: &E) -> Result<Vec<Value>, DescriptorError> {
    let values = entity.to_values();
    if values.len() != E::COLUMNS.len() {
        return Err(DescriptorError::ValueCountMismatch {
            expected: E::COLUMNS.len(),
            actual: values.len(),
        });
    }
    Ok(values)
}

/// Returns whether a value counts as "unset" for partial updates.
///
/// Zero-valued fields are skipped by `update`/`update_bulk` so a caller can
/// send only the fields it wants to change.
pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Integer(number) => *number == 0,
        Value::Real(number) => *number == 0.0,
        Value::Text(text) => text.is_empty(),
        Value::Blob(bytes) => bytes.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_descriptor, is_zero_value, Column, DescriptorError, Entity, Record};
    use rusqlite::types::Value;
    use rusqlite::Row;

    struct Reserved {
        record: Record,
    }

    impl Entity for Reserved {
        const TABLE: &'static str = "reserved";
        const COLUMNS: &'static [Column] = &[Column::new("updated_at", "INTEGER")];

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Null]
        }

        fn from_row(record: Record, _row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self { record })
        }
    }

    struct Duplicated {
        record: Record,
    }

    impl Entity for Duplicated {
        const TABLE: &'static str = "duplicated";
        const COLUMNS: &'static [Column] =
            &[Column::new("name", "TEXT"), Column::new("name", "TEXT")];

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Null, Value::Null]
        }

        fn from_row(record: Record, _row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self { record })
        }
    }

    #[test]
    fn descriptor_rejects_reserved_column() {
        assert_eq!(
            check_descriptor::<Reserved>(),
            Err(DescriptorError::ReservedColumn("updated_at"))
        );
    }

    #[test]
    fn descriptor_rejects_duplicate_column() {
        assert_eq!(
            check_descriptor::<Duplicated>(),
            Err(DescriptorError::DuplicateColumn("name"))
        );
    }

    #[test]
    fn zero_values_cover_every_storage_class() {
        assert!(is_zero_value(&Value::Null));
        assert!(is_zero_value(&Value::Integer(0)));
        assert!(is_zero_value(&Value::Real(0.0)));
        assert!(is_zero_value(&Value::Text(String::new())));
        assert!(is_zero_value(&Value::Blob(Vec::new())));

        assert!(!is_zero_value(&Value::Integer(-1)));
        assert!(!is_zero_value(&Value::Text("x".to_string())));
    }

    #[test]
    fn fresh_record_is_not_deleted() {
        let record = Record::default();
        assert_eq!(record.id, 0);
        assert!(!record.is_deleted());
    }
}
