//! Entity descriptors shared by every repository.
//!
//! # Responsibility
//! - Describe caller-owned record types without runtime reflection.
//! - Carry the backend-managed identity and timestamp fields.
//!
//! # Invariants
//! - Every persisted entity is identified by a backend-assigned `EntityId`.
//! - Deletion is represented by a `deleted_at` marker, not by removing rows.

pub mod entity;
