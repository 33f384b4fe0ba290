//! Pagination shared by list queries.

use serde::Serialize;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Normalized `limit`/`offset` pair.
///
/// Construct through [`Pagination::new`] so the limit stays within
/// `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    /// Normalizes caller input: missing or zero limit falls back to the
    /// default, oversized limits clamp to the maximum.
    pub fn new(limit: Option<u32>, offset: u32) -> Self {
        Self {
            limit: normalize_limit(limit),
            offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, 0)
    }
}

/// One page of results plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

pub fn normalize_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => DEFAULT_PAGE_LIMIT,
        Some(value) if value > MAX_PAGE_LIMIT => MAX_PAGE_LIMIT,
        Some(value) => value,
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
