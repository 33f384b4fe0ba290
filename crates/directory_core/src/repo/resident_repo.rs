//! Resident repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide get/list/create/patch/photo-url persistence over `residents`.
//! - Keep partial-update and deactivation bookkeeping inside one statement.
//!
//! # Invariants
//! - Patches write only supplied columns; the UPDATE text never varies.
//! - Supplying `is_active` moves `deactivated_at` in the same UPDATE.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Listing order: active first, then building, floor, unit, full_name
//!   (nulls last), then id.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::resident::{
    NewResident, Resident, ResidentId, ResidentPatch, ResidentValidationError,
};
use crate::model::timestamp::{format_timestamp, now_utc, parse_timestamp};
use crate::repo::page::{like_contains_pattern, non_blank, Page, Pagination};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Params, Row};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

const RESIDENT_COLUMNS: &str = "
    id,
    full_name,
    unit,
    building,
    floor,
    phone,
    email,
    photo_url,
    notes,
    is_active,
    created_at,
    updated_at,
    deactivated_at";

const RESIDENT_ORDER_BY: &str = " ORDER BY
    is_active DESC,
    building ASC NULLS LAST,
    floor ASC NULLS LAST,
    unit ASC NULLS LAST,
    full_name ASC,
    id ASC";

// Parameter pairs are (is_set, value); ?18 is the write timestamp.
const PATCH_SQL: &str = "UPDATE residents
 SET
    full_name = CASE WHEN ?2 THEN ?3 ELSE full_name END,
    unit = CASE WHEN ?4 THEN ?5 ELSE unit END,
    building = CASE WHEN ?6 THEN ?7 ELSE building END,
    floor = CASE WHEN ?8 THEN ?9 ELSE floor END,
    phone = CASE WHEN ?10 THEN ?11 ELSE phone END,
    email = CASE WHEN ?12 THEN ?13 ELSE email END,
    notes = CASE WHEN ?14 THEN ?15 ELSE notes END,
    is_active = CASE WHEN ?16 THEN ?17 ELSE is_active END,
    deactivated_at = CASE
        WHEN ?16 AND ?17 = 0 THEN COALESCE(deactivated_at, ?18)
        WHEN ?16 AND ?17 = 1 THEN NULL
        ELSE deactivated_at
    END,
    updated_at = ?18
 WHERE id = ?1
 RETURNING";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for resident and audit persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ResidentValidationError),
    Db(DbError),
    NotFound(ResidentId),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "resident not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ResidentValidationError> for RepoError {
    fn from(value: ResidentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Listing filter. Blank strings are treated as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResidentFilter {
    /// Case-insensitive substring over full_name, unit, email and phone.
    pub q: Option<String>,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub unit: Option<String>,
    pub is_active: Option<bool>,
}

/// Repository interface for resident persistence.
pub trait ResidentRepository {
    fn get_resident(&self, id: ResidentId) -> RepoResult<Option<Resident>>;
    fn list_residents(
        &self,
        filter: &ResidentFilter,
        page: Pagination,
    ) -> RepoResult<Page<Resident>>;
    /// Every match in listing order, read by one statement.
    fn list_all_residents(&self, filter: &ResidentFilter) -> RepoResult<Vec<Resident>>;
    fn create_resident(&self, resident: &NewResident) -> RepoResult<Resident>;
    /// Writes only the supplied fields; `NotFound` when `id` is absent.
    fn patch_resident(&self, id: ResidentId, patch: &ResidentPatch) -> RepoResult<Resident>;
    fn set_photo_url(&self, id: ResidentId, photo_url: &str) -> RepoResult<Resident>;
}

/// SQLite-backed resident repository.
///
/// Borrows a plain connection or an open transaction (via deref), so the
/// caller decides the atomicity scope.
pub struct SqliteResidentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResidentRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ResidentRepository for SqliteResidentRepository<'_> {
    fn get_resident(&self, id: ResidentId) -> RepoResult<Option<Resident>> {
        query_one_resident(
            self.conn,
            &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE id = ?1;"),
            [id],
        )
    }

    fn list_residents(
        &self,
        filter: &ResidentFilter,
        page: Pagination,
    ) -> RepoResult<Page<Resident>> {
        let (where_sql, mut bind_values) = resident_where_clause(filter);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM residents{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {RESIDENT_COLUMNS} FROM residents{where_sql}{RESIDENT_ORDER_BY} LIMIT ? OFFSET ?;"
        );
        bind_values.push(Value::Integer(i64::from(page.limit)));
        bind_values.push(Value::Integer(i64::from(page.offset)));
        let items = query_residents(self.conn, &sql, bind_values)?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            limit: page.limit,
            offset: page.offset,
        })
    }

    fn list_all_residents(&self, filter: &ResidentFilter) -> RepoResult<Vec<Resident>> {
        let (where_sql, bind_values) = resident_where_clause(filter);
        let sql =
            format!("SELECT {RESIDENT_COLUMNS} FROM residents{where_sql}{RESIDENT_ORDER_BY};");
        query_residents(self.conn, &sql, bind_values)
    }

    fn create_resident(&self, resident: &NewResident) -> RepoResult<Resident> {
        resident.validate()?;
        let now = format_timestamp(&now_utc());

        let created = query_one_resident(
            self.conn,
            &format!(
                "INSERT INTO residents (
                    full_name,
                    unit,
                    building,
                    floor,
                    phone,
                    email,
                    photo_url,
                    notes,
                    is_active,
                    created_at,
                    updated_at,
                    deactivated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?9,
                    CASE WHEN ?8 = 1 THEN NULL ELSE ?9 END)
                RETURNING {RESIDENT_COLUMNS};"
            ),
            params![
                resident.full_name.as_str(),
                resident.unit.as_str(),
                resident.building.as_deref(),
                resident.floor.as_deref(),
                resident.phone.as_deref(),
                resident.email.as_deref(),
                resident.notes.as_deref(),
                resident.is_active,
                now,
            ],
        )?;

        created.ok_or_else(|| RepoError::InvalidData("insert returned no row".to_string()))
    }

    fn patch_resident(&self, id: ResidentId, patch: &ResidentPatch) -> RepoResult<Resident> {
        patch.validate()?;
        if patch.is_empty() {
            return self.get_resident(id)?.ok_or(RepoError::NotFound(id));
        }

        let now = format_timestamp(&now_utc());
        let updated = query_one_resident(
            self.conn,
            &format!("{PATCH_SQL} {RESIDENT_COLUMNS};"),
            params![
                id,
                patch.full_name.is_set(),
                patch.full_name.as_set().map(String::as_str),
                patch.unit.is_set(),
                patch.unit.as_set().map(String::as_str),
                patch.building.is_set(),
                patch.building.as_set().and_then(|value| value.as_deref()),
                patch.floor.is_set(),
                patch.floor.as_set().and_then(|value| value.as_deref()),
                patch.phone.is_set(),
                patch.phone.as_set().and_then(|value| value.as_deref()),
                patch.email.is_set(),
                patch.email.as_set().and_then(|value| value.as_deref()),
                patch.notes.is_set(),
                patch.notes.as_set().and_then(|value| value.as_deref()),
                patch.is_active.is_set(),
                patch.is_active.as_set().copied().unwrap_or(true),
                now,
            ],
        )?;

        updated.ok_or(RepoError::NotFound(id))
    }

    fn set_photo_url(&self, id: ResidentId, photo_url: &str) -> RepoResult<Resident> {
        let now = format_timestamp(&now_utc());
        let updated = query_one_resident(
            self.conn,
            &format!(
                "UPDATE residents
                 SET
                    photo_url = ?2,
                    updated_at = ?3
                 WHERE id = ?1
                 RETURNING {RESIDENT_COLUMNS};"
            ),
            params![id, photo_url, now],
        )?;

        updated.ok_or(RepoError::NotFound(id))
    }
}

/// Fails with `UninitializedConnection` unless the schema is current.
pub(crate) fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version = current_user_version(conn)?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

fn resident_where_clause(filter: &ResidentFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(q) = non_blank(filter.q.as_deref()) {
        clauses.push(
            "(fold(full_name) LIKE ?1 ESCAPE '\\'
              OR fold(unit) LIKE ?1 ESCAPE '\\'
              OR fold(COALESCE(email, '')) LIKE ?1 ESCAPE '\\'
              OR fold(COALESCE(phone, '')) LIKE ?1 ESCAPE '\\')",
        );
        bind_values.push(Value::Text(like_contains_pattern(&q.to_lowercase())));
    }
    for (column_clause, value) in [
        ("building = ?", filter.building.as_deref()),
        ("floor = ?", filter.floor.as_deref()),
        ("unit = ?", filter.unit.as_deref()),
    ] {
        if let Some(value) = non_blank(value) {
            clauses.push(column_clause);
            bind_values.push(Value::Text(value.to_string()));
        }
    }
    if let Some(is_active) = filter.is_active {
        clauses.push("is_active = ?");
        bind_values.push(Value::Integer(i64::from(is_active)));
    }

    if clauses.is_empty() {
        return (String::new(), bind_values);
    }
    (format!(" WHERE {}", clauses.join(" AND ")), bind_values)
}

fn query_residents(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Resident>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_resident_row(row)?);
    }
    Ok(items)
}

fn query_one_resident<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> RepoResult<Option<Resident>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_resident_row(row)?));
    }
    Ok(None)
}

fn parse_resident_row(row: &Row<'_>) -> RepoResult<Resident> {
    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in residents.is_active"
            )));
        }
    };

    let resident = Resident {
        id: row.get("id")?,
        full_name: row.get("full_name")?,
        unit: row.get("unit")?,
        building: row.get("building")?,
        floor: row.get("floor")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
        photo_url: row.get("photo_url")?,
        notes: row.get("notes")?,
        is_active,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
        deactivated_at: optional_timestamp_column(row, "deactivated_at")?,
    };
    resident.validate()?;
    Ok(resident)
}

pub(crate) fn timestamp_column(row: &Row<'_>, column: &str) -> RepoResult<DateTime<Utc>> {
    let text: String = row.get(column)?;
    parse_timestamp(&text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{text}` in {column}")))
}

fn optional_timestamp_column(row: &Row<'_>, column: &str) -> RepoResult<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => parse_timestamp(&text).map(Some).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid timestamp `{text}` in {column}"))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{resident_where_clause, ResidentFilter};

    #[test]
    fn empty_filter_produces_no_where_clause() {
        let (sql, values) = resident_where_clause(&ResidentFilter::default());
        assert!(sql.is_empty());
        assert!(values.is_empty());
    }

    #[test]
    fn blank_filters_are_ignored() {
        let filter = ResidentFilter {
            q: Some("  ".to_string()),
            building: Some(String::new()),
            is_active: Some(false),
            ..ResidentFilter::default()
        };
        let (sql, values) = resident_where_clause(&filter);
        assert_eq!(sql, " WHERE is_active = ?");
        assert_eq!(values.len(), 1);
    }
}
