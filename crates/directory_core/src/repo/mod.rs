//! Repository layer: SQLite persistence for residents and the audit log.
//!
//! # Responsibility
//! - Keep SQL inside the persistence boundary.
//! - Return semantic errors (`NotFound`, validation) next to storage errors.
//!
//! # Invariants
//! - Write paths validate inputs before touching SQL.
//! - Repositories only run on connections migrated to the latest schema.
//! - Repositories never open transactions; callers own the transaction scope.

pub mod audit_repo;
pub mod page;
pub mod resident_repo;
