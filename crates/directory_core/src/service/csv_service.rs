//! CSV export/import over the resident service.
//!
//! # Responsibility
//! - Project a filtered resident listing into fixed-column CSV bytes.
//! - Ingest CSV rows one audited mutation at a time, isolating row failures.
//!
//! # Invariants
//! - The export header is always written, even for zero rows.
//! - Undecodable input fails before any row is touched.
//! - A failing row never aborts the batch; every row commits on its own.

use crate::auth::Principal;
use crate::model::audit::AuditAction;
use crate::model::resident::{NewResident, Patch, Resident, ResidentId, ResidentPatch};
use crate::model::timestamp::format_timestamp;
use crate::repo::resident_repo::{ResidentFilter, ResidentRepository};
use crate::service::resident_service::{
    MutationTarget, ResidentService, ServiceError, ServiceResult,
};
use csv::{ReaderBuilder, StringRecord, Writer};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Column order of exported files.
pub const EXPORT_HEADER: [&str; 13] = [
    "id",
    "full_name",
    "unit",
    "building",
    "floor",
    "phone",
    "email",
    "photo_url",
    "notes",
    "is_active",
    "created_at",
    "updated_at",
    "deactivated_at",
];

const OPTIONAL_TEXT_COLUMNS: [&str; 5] = ["building", "floor", "phone", "email", "notes"];
const TRUE_TOKENS: [&str; 4] = ["1", "true", "yes", "y"];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Aggregated import outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvImportResult {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    /// `Line <n>: <message>` per skipped row, in input order.
    pub errors: Vec<String>,
}

/// Successful row result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Created(ResidentId),
    Updated(ResidentId),
}

/// Row-level import failure. Captured into the result, never escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    Validation(String),
    NotFound(ResidentId),
    InvalidId(String),
    /// Record could not be read by the CSV parser.
    Malformed(String),
    /// Persistence failed for this row; its transaction was rolled back.
    Storage(String),
}

impl RowError {
    /// Stable tag for log lines, which must not carry cell contents.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::InvalidId(_) => "invalid_id",
            Self::Malformed(_) => "malformed",
            Self::Storage(_) => "storage",
        }
    }
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::NotFound(id) => write!(f, "id={id} not found for update"),
            Self::InvalidId(raw) => write!(f, "invalid id `{raw}`"),
            Self::Malformed(message) => write!(f, "malformed row: {message}"),
            Self::Storage(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RowError {}

impl From<ServiceError> for RowError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound(id) => Self::NotFound(id),
            ServiceError::Validation(message) => Self::Validation(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Exports every resident matching `filter` and records `EXPORT_CSV`.
pub fn export_residents_csv(
    service: &mut ResidentService<'_>,
    actor: Option<&Principal>,
    filter: &ResidentFilter,
) -> ServiceResult<Vec<u8>> {
    let residents = service.list_all_residents(filter)?;

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER).map_err(transport)?;
    for resident in &residents {
        writer.write_record(export_row(resident)).map_err(transport)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ServiceError::Transport(err.to_string()))?;

    let filters = serde_json::to_value(filter).map_err(ServiceError::Snapshot)?;
    service.record_event(
        actor,
        AuditAction::ExportCsv,
        json!({ "filters": filters, "rows": residents.len() }),
    )?;
    info!(
        "event=csv_export module=service status=ok rows={} bytes={}",
        residents.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Imports residents from UTF-8 CSV bytes and records `IMPORT_CSV`.
///
/// Rows carrying a non-blank `id` update that resident; other rows create
/// one. Line numbers count the header as line 1.
pub fn import_residents_csv(
    service: &mut ResidentService<'_>,
    actor: Option<&Principal>,
    bytes: &[u8],
) -> ServiceResult<CsvImportResult> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(body)
        .map_err(|_| ServiceError::Transport("CSV must be UTF-8 encoded".to_string()))?;

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = ColumnIndex::new(reader.headers().map_err(transport)?);

    let mut result = CsvImportResult::default();
    for (ordinal, record) in reader.records().enumerate() {
        let line = ordinal + 2;
        let outcome = record
            .map_err(|err| RowError::Malformed(err.to_string()))
            .and_then(|record| import_row(service, actor, &columns, &record, line));
        match outcome {
            Ok(RowOutcome::Created(_)) => result.created += 1,
            Ok(RowOutcome::Updated(_)) => result.updated += 1,
            Err(err) => {
                warn!(
                    "event=csv_import_row module=service status=skipped line={line} error_kind={}",
                    err.kind()
                );
                result.skipped += 1;
                result.errors.push(format!("Line {line}: {err}"));
            }
        }
    }

    service.record_event(
        actor,
        AuditAction::ImportCsv,
        json!({
            "created": result.created,
            "updated": result.updated,
            "skipped": result.skipped,
        }),
    )?;
    info!(
        "event=csv_import module=service status=ok created={} updated={} skipped={}",
        result.created, result.updated, result.skipped
    );
    Ok(result)
}

fn import_row(
    service: &mut ResidentService<'_>,
    actor: Option<&Principal>,
    columns: &ColumnIndex,
    record: &StringRecord,
    line: usize,
) -> Result<RowOutcome, RowError> {
    let full_name = columns.trimmed(record, "full_name").unwrap_or_default();
    let unit = columns.trimmed(record, "unit").unwrap_or_default();
    if full_name.is_empty() || unit.is_empty() {
        return Err(RowError::Validation(
            "full_name and unit are required".to_string(),
        ));
    }

    let mut patch = ResidentPatch {
        full_name: Patch::Set(full_name.to_string()),
        unit: Patch::Set(unit.to_string()),
        ..ResidentPatch::default()
    };
    for column in OPTIONAL_TEXT_COLUMNS {
        if let Some(value) = columns.trimmed(record, column) {
            let value = (!value.is_empty()).then(|| value.to_string());
            match column {
                "building" => patch.building = Patch::Set(value),
                "floor" => patch.floor = Patch::Set(value),
                "phone" => patch.phone = Patch::Set(value),
                "email" => patch.email = Patch::Set(value),
                _ => patch.notes = Patch::Set(value),
            }
        }
    }
    if let Some(raw) = columns.trimmed(record, "is_active").filter(|raw| !raw.is_empty()) {
        patch.is_active = Patch::Set(parse_active_token(raw));
    }

    let metadata = json!({ "row": line });
    match columns.trimmed(record, "id").filter(|raw| !raw.is_empty()) {
        Some(raw_id) => {
            let id: ResidentId = raw_id
                .parse()
                .map_err(|_| RowError::InvalidId(raw_id.to_string()))?;
            let updated = service.audited(
                actor,
                AuditAction::ImportUpdateResident,
                MutationTarget::Existing(id),
                Some(metadata),
                |repo| repo.patch_resident(id, &patch),
            )?;
            Ok(RowOutcome::Updated(updated.id))
        }
        None => {
            let resident = new_resident_from(patch);
            let created = service.audited(
                actor,
                AuditAction::ImportCreateResident,
                MutationTarget::New,
                Some(metadata),
                |repo| repo.create_resident(&resident),
            )?;
            Ok(RowOutcome::Created(created.id))
        }
    }
}

fn new_resident_from(patch: ResidentPatch) -> NewResident {
    let text = |value: Patch<Option<String>>| match value {
        Patch::Set(value) => value,
        Patch::Keep => None,
    };
    NewResident {
        full_name: patch.full_name.as_set().cloned().unwrap_or_default(),
        unit: patch.unit.as_set().cloned().unwrap_or_default(),
        is_active: patch.is_active.as_set().copied().unwrap_or(true),
        building: text(patch.building),
        floor: text(patch.floor),
        phone: text(patch.phone),
        email: text(patch.email),
        notes: text(patch.notes),
    }
}

/// `1`, `true`, `yes`, `y` (any case) are true; every other token is false.
pub fn parse_active_token(raw: &str) -> bool {
    let token = raw.trim().to_ascii_lowercase();
    TRUE_TOKENS.contains(&token.as_str())
}

fn export_row(resident: &Resident) -> [String; 13] {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    [
        resident.id.to_string(),
        resident.full_name.clone(),
        resident.unit.clone(),
        text(&resident.building),
        text(&resident.floor),
        text(&resident.phone),
        text(&resident.email),
        text(&resident.photo_url),
        text(&resident.notes),
        resident.is_active.to_string(),
        format_timestamp(&resident.created_at),
        format_timestamp(&resident.updated_at),
        resident
            .deactivated_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default(),
    ]
}

fn transport(err: csv::Error) -> ServiceError {
    ServiceError::Transport(err.to_string())
}

/// Header name to column position. Missing columns read as absent.
struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    fn new(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();
        Self { positions }
    }

    fn trimmed<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        let index = *self.positions.get(column)?;
        record.get(index).map(str::trim)
    }
}
