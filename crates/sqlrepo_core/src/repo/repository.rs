//! Entity-generic repository contract and error model.
//!
//! # Responsibility
//! - Expose the eight CRUD operations every backend adapter implements.
//! - Classify failures into not-found, context and backend errors.
//!
//! # Invariants
//! - A failed call returns no entity and no partial result set.
//! - Bulk operations either succeed for every row or fail as a whole.

use crate::context::{ContextError, ExecContext};
use crate::db::DbError;
use crate::model::entity::{DescriptorError, Entity, EntityId, EntityValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by repository operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(EntityValidationError),
    Db(DbError),
    NotFound {
        table: &'static str,
        id: EntityId,
    },
    Cancelled,
    DeadlineExceeded,
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn status(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Cancelled | Self::DeadlineExceeded => "cancelled",
            Self::Validation(_) => "rejected",
            _ => "error",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { table, id } => write!(f, "record not found: {table} id={id}"),
            Self::Cancelled => write!(f, "{}", ContextError::Cancelled),
            Self::DeadlineExceeded => write!(f, "{}", ContextError::DeadlineExceeded),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "connection is missing required table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "table `{table}` is missing required column `{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<DescriptorError> for RepoError {
    fn from(value: DescriptorError) -> Self {
        Self::Db(DbError::Descriptor(value))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ContextError> for RepoError {
    fn from(value: ContextError) -> Self {
        match value {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// CRUD contract over entity type `E`.
///
/// Every call takes an [`ExecContext`]; an implementation must stop and
/// report the context error once it fires.
pub trait Repository<E: Entity> {
    /// Persists one entity and returns it with its assigned id and timestamps.
    fn create(&self, ctx: &ExecContext, entity: E) -> RepoResult<E>;

    /// Persists all entities or none of them.
    fn create_bulk(&self, ctx: &ExecContext, entities: Vec<E>) -> RepoResult<Vec<E>>;

    /// Returns the live entity with `id`, or `NotFound`.
    fn get(&self, ctx: &ExecContext, id: EntityId) -> RepoResult<E>;

    /// Returns the live entities whose id is in `ids`. Unknown ids are skipped.
    fn find(&self, ctx: &ExecContext, ids: &[EntityId]) -> RepoResult<Vec<E>>;

    /// Writes the non-zero fields of `entity` onto the row `id` and returns
    /// the persisted result. Zero affected rows is `NotFound`.
    fn update(&self, ctx: &ExecContext, id: EntityId, entity: &E) -> RepoResult<E>;

    /// Writes the non-zero fields of `entity` onto every row in `ids`, then
    /// re-reads them.
    fn update_bulk(&self, ctx: &ExecContext, ids: &[EntityId], entity: &E)
        -> RepoResult<Vec<E>>;

    /// Soft-deletes `id` and returns its state from just before deletion,
    /// with the deletion marker set.
    fn remove(&self, ctx: &ExecContext, id: EntityId) -> RepoResult<E>;

    /// Soft-deletes every live row in `ids` and returns them.
    fn remove_bulk(&self, ctx: &ExecContext, ids: &[EntityId]) -> RepoResult<Vec<E>>;
}
