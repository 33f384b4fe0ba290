//! Resident domain model.
//!
//! # Responsibility
//! - Define the canonical resident record and its create/patch inputs.
//! - Own the validation rules shared by store and import paths.
//!
//! # Invariants
//! - `id` is assigned by storage and never changes.
//! - `full_name` and `unit` are never blank.
//! - `deactivated_at.is_some()` iff `!is_active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned resident identifier.
pub type ResidentId = i64;

/// Entity type tag used by audit entries that reference residents.
pub const RESIDENT_ENTITY_TYPE: &str = "resident";

/// Canonical resident record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub full_name: String,
    pub unit: String,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Public URL returned by the blob store on photo upload.
    pub photo_url: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on deactivation, cleared on reactivation.
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Resident {
    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), ResidentValidationError> {
        require_text("full_name", &self.full_name)?;
        require_text("unit", &self.unit)?;
        if self.is_active == self.deactivated_at.is_some() {
            return Err(ResidentValidationError::DeactivationMismatch {
                is_active: self.is_active,
            });
        }
        Ok(())
    }
}

/// Validation failure for resident inputs or persisted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResidentValidationError {
    /// Mandatory text field is empty after trimming.
    BlankField(&'static str),
    /// `deactivated_at` disagrees with `is_active`.
    DeactivationMismatch { is_active: bool },
}

impl Display for ResidentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
            Self::DeactivationMismatch { is_active } => write!(
                f,
                "deactivated_at must be {} when is_active={is_active}",
                if *is_active { "null" } else { "set" }
            ),
        }
    }
}

impl Error for ResidentValidationError {}

/// Input for creating a resident.
///
/// `photo_url` is not accepted here; photos only arrive through upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResident {
    pub full_name: String,
    pub unit: String,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
}

impl NewResident {
    /// Creates an active resident input with only the mandatory fields set.
    pub fn new(full_name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            unit: unit.into(),
            building: None,
            floor: None,
            phone: None,
            email: None,
            notes: None,
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<(), ResidentValidationError> {
        require_text("full_name", &self.full_name)?;
        require_text("unit", &self.unit)
    }
}

/// Present/absent marker for one field of a partial update.
///
/// `Keep` leaves the stored value untouched; `Set` overwrites it. For
/// nullable columns `Set(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Keep => None,
            Self::Set(value) => Some(value),
        }
    }
}

/// Partial update for a resident. Unset fields are never written.
///
/// Supplying `is_active` also moves `deactivated_at` in the same write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResidentPatch {
    pub full_name: Patch<String>,
    pub unit: Patch<String>,
    pub building: Patch<Option<String>>,
    pub floor: Patch<Option<String>>,
    pub phone: Patch<Option<String>>,
    pub email: Patch<Option<String>>,
    pub notes: Patch<Option<String>>,
    pub is_active: Patch<bool>,
}

impl ResidentPatch {
    /// Patch that only flips the active flag.
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Patch::Set(is_active),
            ..Self::default()
        }
    }

    /// Returns `true` when no field is supplied.
    pub fn is_empty(&self) -> bool {
        !(self.full_name.is_set()
            || self.unit.is_set()
            || self.building.is_set()
            || self.floor.is_set()
            || self.phone.is_set()
            || self.email.is_set()
            || self.notes.is_set()
            || self.is_active.is_set())
    }

    pub fn validate(&self) -> Result<(), ResidentValidationError> {
        if let Some(full_name) = self.full_name.as_set() {
            require_text("full_name", full_name)?;
        }
        if let Some(unit) = self.unit.as_set() {
            require_text("unit", unit)?;
        }
        Ok(())
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ResidentValidationError> {
    if value.trim().is_empty() {
        return Err(ResidentValidationError::BlankField(field));
    }
    Ok(())
}
