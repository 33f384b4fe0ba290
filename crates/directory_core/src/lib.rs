//! Core domain logic for the residential directory.
//! Every resident mutation and its audit entry commit together through
//! this crate.

pub mod auth;
pub mod blob;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use auth::{
    require_roles, AuthError, Authenticator, Principal, StaticAuthenticator, ROLE_ADMIN,
    ROLE_VIEWER,
};
pub use blob::{BlobError, BlobResult, BlobStore, FsBlobStore};
pub use config::{ConfigError, DirectoryConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LogSettings,
    LoggingError,
};
pub use model::audit::{AuditAction, AuditEntry, AuditEntryId, NewAuditEntry};
pub use model::resident::{
    NewResident, Patch, Resident, ResidentId, ResidentPatch, ResidentValidationError,
};
pub use repo::audit_repo::{AuditFilter, AuditRepository, SqliteAuditRepository};
pub use repo::page::{Page, Pagination};
pub use repo::resident_repo::{
    RepoError, RepoResult, ResidentFilter, ResidentRepository, SqliteResidentRepository,
};
pub use service::csv_service::{
    export_residents_csv, import_residents_csv, CsvImportResult, RowError, RowOutcome,
};
pub use service::resident_service::{
    MutationTarget, PhotoUpload, ResidentService, ServiceError, ServiceResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
