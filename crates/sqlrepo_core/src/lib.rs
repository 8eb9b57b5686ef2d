//! Entity-generic CRUD repositories over SQLite.
//! Callers depend on `Repository<E>`; `SqlRepository<E>` is the only adapter.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use context::{CancelHandle, ContextError, ExecContext};
pub use db::schema::auto_migrate;
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbConfig, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig};
pub use model::entity::{
    Column, DescriptorError, Entity, EntityId, EntityValidationError, Record,
};
pub use repo::repository::{RepoError, RepoResult, Repository};
pub use repo::sql_repo::SqlRepository;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
