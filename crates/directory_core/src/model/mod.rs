//! Domain model for the resident directory.
//!
//! # Responsibility
//! - Define the resident record, its partial-update shape and the audit entry.
//!
//! # Invariants
//! - Residents are never hard-deleted; deactivation is the only removal.
//! - Audit entries are immutable once written.

pub mod audit;
pub mod resident;
pub mod timestamp;
