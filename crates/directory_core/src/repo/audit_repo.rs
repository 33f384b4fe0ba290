//! Audit log repository: the append-only recorder behind every mutation.
//!
//! # Responsibility
//! - Append one immutable entry per call.
//! - List entries with exact/substring filters, newest first.
//!
//! # Invariants
//! - This module never issues UPDATE or DELETE against `audit_log`; the
//!   schema rejects both.
//! - JSON payloads are stored exactly as given, no diffing.

use crate::model::audit::{AuditEntry, NewAuditEntry};
use crate::model::timestamp::{format_timestamp, now_utc};
use crate::repo::page::{like_contains_pattern, non_blank, Page, Pagination};
use crate::repo::resident_repo::{
    ensure_schema_ready, timestamp_column, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

const AUDIT_COLUMNS: &str = "
    id,
    actor_user_id,
    actor_email,
    action,
    entity_type,
    entity_id,
    before,
    after,
    metadata,
    created_at";

/// Audit listing filter. Blank strings are treated as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditFilter {
    /// Exact action tag, e.g. `CREATE_RESIDENT`.
    pub action: Option<String>,
    /// Case-insensitive substring of the actor email.
    pub actor_email: Option<String>,
    /// Exact entity type, e.g. `resident`.
    pub entity_type: Option<String>,
}

/// Repository interface for the audit trail.
pub trait AuditRepository {
    /// Appends one entry and returns it as stored.
    fn record(&self, entry: &NewAuditEntry) -> RepoResult<AuditEntry>;
    fn list_entries(&self, filter: &AuditFilter, page: Pagination) -> RepoResult<Page<AuditEntry>>;
}

/// SQLite-backed audit repository.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn record(&self, entry: &NewAuditEntry) -> RepoResult<AuditEntry> {
        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO audit_log (
                actor_user_id,
                actor_email,
                action,
                entity_type,
                entity_id,
                before,
                after,
                metadata,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING {AUDIT_COLUMNS};"
        ))?;
        let mut rows = stmt.query(params![
            entry.actor_user_id,
            entry.actor_email.as_deref(),
            entry.action.as_str(),
            entry.entity_type.as_deref(),
            entry.entity_id.as_deref(),
            entry.before.as_ref().map(ToString::to_string),
            entry.after.as_ref().map(ToString::to_string),
            entry.metadata.as_ref().map(ToString::to_string),
            format_timestamp(&now_utc()),
        ])?;

        if let Some(row) = rows.next()? {
            return parse_audit_row(row);
        }
        Err(RepoError::InvalidData(
            "audit insert returned no row".to_string(),
        ))
    }

    fn list_entries(&self, filter: &AuditFilter, page: Pagination) -> RepoResult<Page<AuditEntry>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(action) = non_blank(filter.action.as_deref()) {
            clauses.push("action = ?");
            bind_values.push(Value::Text(action.to_string()));
        }
        if let Some(actor_email) = non_blank(filter.actor_email.as_deref()) {
            clauses.push("fold(actor_email) LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(like_contains_pattern(
                &actor_email.to_lowercase(),
            )));
        }
        if let Some(entity_type) = non_blank(filter.entity_type.as_deref()) {
            clauses.push("entity_type = ?");
            bind_values.push(Value::Text(entity_type.to_string()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_log{where_sql};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        bind_values.push(Value::Integer(i64::from(page.limit)));
        bind_values.push(Value::Integer(i64::from(page.offset)));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS}
             FROM audit_log{where_sql}
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_audit_row(row)?);
        }

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            limit: page.limit,
            offset: page.offset,
        })
    }
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<AuditEntry> {
    Ok(AuditEntry {
        id: row.get("id")?,
        actor_user_id: row.get("actor_user_id")?,
        actor_email: row.get("actor_email")?,
        action: row.get("action")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        before: json_column(row, "before")?,
        after: json_column(row, "after")?,
        metadata: json_column(row, "metadata")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn json_column(row: &Row<'_>, column: &str) -> RepoResult<Option<serde_json::Value>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|err| {
            RepoError::InvalidData(format!("invalid json in audit_log.{column}: {err}"))
        }),
        None => Ok(None),
    }
}
