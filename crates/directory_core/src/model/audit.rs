//! Audit trail model.
//!
//! # Invariants
//! - Entries are append-only; nothing updates or deletes them.
//! - `before`/`after`/`metadata` are stored exactly as given.
//! - `entity_id` is a loose reference and may outlive its entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage-assigned audit entry identifier.
pub type AuditEntryId = i64;

/// Mutation kinds recorded by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateResident,
    UpdateResident,
    DeactivateResident,
    UploadResidentPhoto,
    ImportCreateResident,
    ImportUpdateResident,
    ImportCsv,
    ExportCsv,
}

impl AuditAction {
    /// Persisted action tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateResident => "CREATE_RESIDENT",
            Self::UpdateResident => "UPDATE_RESIDENT",
            Self::DeactivateResident => "DEACTIVATE_RESIDENT",
            Self::UploadResidentPhoto => "UPLOAD_RESIDENT_PHOTO",
            Self::ImportCreateResident => "IMPORT_CREATE_RESIDENT",
            Self::ImportUpdateResident => "IMPORT_UPDATE_RESIDENT",
            Self::ImportCsv => "IMPORT_CSV",
            Self::ExportCsv => "EXPORT_CSV",
        }
    }
}

/// Persisted audit entry.
///
/// `action` stays a plain string on read so entries written by other
/// producers remain listable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_user_id: Option<i64>,
    pub actor_email: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending one audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor_user_id: Option<i64>,
    pub actor_email: Option<String>,
    pub action: AuditAction,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
}

impl NewAuditEntry {
    /// System-attributed entry with only the action set.
    pub fn new(action: AuditAction) -> Self {
        Self {
            actor_user_id: None,
            actor_email: None,
            action,
            entity_type: None,
            entity_id: None,
            before: None,
            after: None,
            metadata: None,
        }
    }
}
