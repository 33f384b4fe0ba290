//! Resident use-case service: the audited mutation orchestrator.
//!
//! # Responsibility
//! - Run every resident mutation as `read-before -> mutate -> record-audit
//!   -> commit` inside one write transaction.
//! - Expose read use-cases (get/list residents, list audit entries).
//!
//! # Invariants
//! - Each successful mutation appends exactly one audit entry, even when the
//!   mutation changes nothing.
//! - A missing target fails with `NotFound` before anything is written.
//! - Any failure rolls back both the resident write and the audit entry.

use crate::auth::Principal;
use crate::blob::{BlobError, BlobStore};
use crate::config::DEFAULT_PHOTO_MAX_BYTES;
use crate::model::audit::{AuditAction, AuditEntry, NewAuditEntry};
use crate::model::resident::{
    NewResident, Resident, ResidentId, ResidentPatch, ResidentValidationError,
    RESIDENT_ENTITY_TYPE,
};
use crate::repo::audit_repo::{AuditFilter, AuditRepository, SqliteAuditRepository};
use crate::repo::page::{Page, Pagination};
use crate::repo::resident_repo::{
    RepoError, RepoResult, ResidentFilter, ResidentRepository, SqliteResidentRepository,
};
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DEFAULT_PHOTO_EXTENSION: &str = "jpg";

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for resident use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Missing or malformed input.
    Validation(String),
    /// Target resident does not exist.
    NotFound(ResidentId),
    /// Input bytes could not be decoded.
    Transport(String),
    Blob(BlobError),
    /// Snapshot could not be serialized for the audit trail.
    Snapshot(serde_json::Error),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::NotFound(id) => write!(f, "resident not found: {id}"),
            Self::Transport(message) => write!(f, "{message}"),
            Self::Blob(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "snapshot serialization failed: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Blob(err) => Some(err),
            Self::Snapshot(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<ResidentValidationError> for ServiceError {
    fn from(value: ResidentValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<BlobError> for ServiceError {
    fn from(value: BlobError) -> Self {
        Self::Blob(value)
    }
}

/// Which resident a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    /// Insert; the audit `before` is null.
    New,
    /// Existing resident; its current state becomes the audit `before`.
    Existing(ResidentId),
}

/// Photo payload accepted by [`ResidentService::upload_photo`].
#[derive(Debug, Clone, Copy)]
pub struct PhotoUpload<'a> {
    /// Client-side file name; only its extension is used.
    pub file_name: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// Resident use-case service over a borrowed connection.
pub struct ResidentService<'conn> {
    conn: &'conn mut Connection,
    photo_max_bytes: usize,
}

impl<'conn> ResidentService<'conn> {
    /// Creates a service using a migrated connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self {
            conn,
            photo_max_bytes: DEFAULT_PHOTO_MAX_BYTES,
        }
    }

    /// Overrides the upload size limit.
    pub fn with_photo_max_bytes(mut self, photo_max_bytes: usize) -> Self {
        self.photo_max_bytes = photo_max_bytes;
        self
    }

    /// Gets one resident by id.
    pub fn get_resident(&self, id: ResidentId) -> ServiceResult<Resident> {
        let repo = SqliteResidentRepository::try_new(&*self.conn)?;
        repo.get_resident(id)?.ok_or(ServiceError::NotFound(id))
    }

    /// Lists residents matching `filter`.
    pub fn list_residents(
        &self,
        filter: &ResidentFilter,
        page: Pagination,
    ) -> ServiceResult<Page<Resident>> {
        let repo = SqliteResidentRepository::try_new(&*self.conn)?;
        Ok(repo.list_residents(filter, page)?)
    }

    /// Every resident matching `filter`, as one consistent read.
    pub fn list_all_residents(&self, filter: &ResidentFilter) -> ServiceResult<Vec<Resident>> {
        let repo = SqliteResidentRepository::try_new(&*self.conn)?;
        Ok(repo.list_all_residents(filter)?)
    }

    /// Lists audit entries, newest first.
    pub fn list_audit_entries(
        &self,
        filter: &AuditFilter,
        page: Pagination,
    ) -> ServiceResult<Page<AuditEntry>> {
        let repo = SqliteAuditRepository::try_new(&*self.conn)?;
        Ok(repo.list_entries(filter, page)?)
    }

    /// Creates a resident (`CREATE_RESIDENT`).
    pub fn create_resident(
        &mut self,
        actor: Option<&Principal>,
        resident: &NewResident,
    ) -> ServiceResult<Resident> {
        resident.validate()?;
        self.audited(
            actor,
            AuditAction::CreateResident,
            MutationTarget::New,
            None,
            |repo| repo.create_resident(resident),
        )
    }

    /// Applies a partial update (`UPDATE_RESIDENT`).
    pub fn update_resident(
        &mut self,
        actor: Option<&Principal>,
        id: ResidentId,
        patch: &ResidentPatch,
    ) -> ServiceResult<Resident> {
        patch.validate()?;
        self.audited(
            actor,
            AuditAction::UpdateResident,
            MutationTarget::Existing(id),
            None,
            |repo| repo.patch_resident(id, patch),
        )
    }

    /// Deactivates a resident (`DEACTIVATE_RESIDENT`).
    ///
    /// Already-inactive residents keep their first `deactivated_at`; the
    /// call is still audited.
    pub fn deactivate_resident(
        &mut self,
        actor: Option<&Principal>,
        id: ResidentId,
    ) -> ServiceResult<Resident> {
        let patch = ResidentPatch::active(false);
        self.audited(
            actor,
            AuditAction::DeactivateResident,
            MutationTarget::Existing(id),
            None,
            |repo| repo.patch_resident(id, &patch),
        )
    }

    /// Stores a photo and records its URL (`UPLOAD_RESIDENT_PHOTO`).
    ///
    /// The resident must exist before any bytes reach the blob store.
    pub fn upload_photo(
        &mut self,
        actor: Option<&Principal>,
        id: ResidentId,
        upload: PhotoUpload<'_>,
        store: &dyn BlobStore,
    ) -> ServiceResult<Resident> {
        let extension = photo_extension(upload.file_name)?;
        if upload.bytes.len() > self.photo_max_bytes {
            return Err(ServiceError::Validation(format!(
                "photo too large: {} bytes (max {})",
                upload.bytes.len(),
                self.photo_max_bytes
            )));
        }
        if upload.bytes.is_empty() {
            return Err(ServiceError::Validation("photo is empty".to_string()));
        }
        self.get_resident(id)?;

        let photo_url = store.put(upload.bytes, Some(extension))?;
        let metadata = json!({
            "filename": upload.file_name,
            "url": photo_url,
            "bytes": upload.bytes.len(),
        });
        self.audited(
            actor,
            AuditAction::UploadResidentPhoto,
            MutationTarget::Existing(id),
            Some(metadata),
            |repo| repo.set_photo_url(id, &photo_url),
        )
    }

    /// Runs one audited resident mutation in a single write transaction.
    ///
    /// `mutate` receives a repository bound to the transaction and returns
    /// the post-mutation state, which becomes the audit `after`.
    pub fn audited<F>(
        &mut self,
        actor: Option<&Principal>,
        action: AuditAction,
        target: MutationTarget,
        metadata: Option<Value>,
        mutate: F,
    ) -> ServiceResult<Resident>
    where
        F: FnOnce(&SqliteResidentRepository<'_>) -> RepoResult<Resident>,
    {
        let started_at = Instant::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = (|| -> ServiceResult<(Resident, AuditEntry)> {
            let residents = SqliteResidentRepository::try_new(&tx)?;
            let audit = SqliteAuditRepository::try_new(&tx)?;

            let before = match target {
                MutationTarget::New => None,
                MutationTarget::Existing(id) => Some(
                    residents
                        .get_resident(id)?
                        .ok_or(ServiceError::NotFound(id))?,
                ),
            };
            let after = mutate(&residents)?;

            let mut entry = NewAuditEntry::new(action);
            entry.actor_user_id = actor.map(|principal| principal.id);
            entry.actor_email = actor.map(|principal| principal.email.clone());
            entry.entity_type = Some(RESIDENT_ENTITY_TYPE.to_string());
            entry.entity_id = Some(after.id.to_string());
            entry.before = before.as_ref().map(snapshot).transpose()?;
            entry.after = Some(snapshot(&after)?);
            entry.metadata = metadata;
            let recorded = audit.record(&entry)?;
            Ok((after, recorded))
        })();

        match outcome {
            Ok((after, recorded)) => {
                tx.commit()?;
                info!(
                    "event=resident_mutation module=service status=ok action={} resident_id={} audit_id={} duration_ms={}",
                    action.as_str(),
                    after.id,
                    recorded.id,
                    started_at.elapsed().as_millis()
                );
                Ok(after)
            }
            Err(err) => {
                // Dropping `tx` rolls back the resident write and the audit row.
                drop(tx);
                warn!(
                    "event=resident_mutation module=service status=error action={} target={:?} duration_ms={} error={}",
                    action.as_str(),
                    target,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Appends one entity-less audit entry, e.g. an import/export summary.
    pub fn record_event(
        &mut self,
        actor: Option<&Principal>,
        action: AuditAction,
        metadata: Value,
    ) -> ServiceResult<AuditEntry> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let recorded = {
            let audit = SqliteAuditRepository::try_new(&tx)?;
            let mut entry = NewAuditEntry::new(action);
            entry.actor_user_id = actor.map(|principal| principal.id);
            entry.actor_email = actor.map(|principal| principal.email.clone());
            entry.entity_type = Some(RESIDENT_ENTITY_TYPE.to_string());
            entry.metadata = Some(metadata);
            audit.record(&entry)?
        };
        tx.commit()?;
        info!(
            "event=audit_event module=service status=ok action={} audit_id={}",
            action.as_str(),
            recorded.id
        );
        Ok(recorded)
    }
}

fn snapshot(resident: &Resident) -> ServiceResult<Value> {
    serde_json::to_value(resident).map_err(ServiceError::Snapshot)
}

/// Validates the upload extension; no extension means jpg.
fn photo_extension(file_name: Option<&str>) -> ServiceResult<&'static str> {
    let extension = file_name
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension {
        None => Ok(DEFAULT_PHOTO_EXTENSION),
        Some(ext) => PHOTO_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == ext)
            .copied()
            .ok_or_else(|| ServiceError::Validation(format!("unsupported file type: .{ext}"))),
    }
}
