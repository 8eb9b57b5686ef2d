//! Repository contract and its SQLite adapter.
//!
//! # Responsibility
//! - Define the entity-generic CRUD contract callers depend on.
//! - Keep SQL details inside the adapter.
//!
//! # Invariants
//! - Write paths run `Entity::validate()` before any SQL mutation.
//! - Repository APIs return semantic errors (`NotFound`, context errors) in
//!   addition to DB transport errors.

pub mod repository;
pub mod sql_repo;
