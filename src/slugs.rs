use rusqlite::{params, OptionalExtension};

use crate::db::DbPool;
use crate::error::Result;

/// Tables whose `slug` column is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Posts,
    Categories,
    Tags,
}

impl SlugTable {
    fn name(self) -> &'static str {
        match self {
            SlugTable::Posts => "posts",
            SlugTable::Categories => "categories",
            SlugTable::Tags => "tags",
        }
    }
}

/// URL-safe slug: lowercase ASCII, runs of anything else collapsed into a
/// single `-`, never leading or trailing `-`.
pub fn slugify(text: &str) -> String {
    ::slug::slugify(text)
}

/// Slug for a user-supplied value, falling back to the title/name when the
/// explicit slug is blank.
pub fn slug_or_derive(explicit: Option<&str>, source: &str) -> String {
    let base = match explicit.map(str::trim) {
        Some(s) if !s.is_empty() => slugify(s),
        _ => slugify(source),
    };
    if base.is_empty() {
        "untitled".to_string()
    } else {
        base
    }
}

/// First of `base`, `base-2`, `base-3`, ... not used by another row.
/// `exclude_id` lets an update keep its own slug.
pub fn unique_slug(pool: &DbPool, table: SlugTable, base: &str, exclude_id: Option<i64>) -> Result<String> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT id FROM {} WHERE slug = ?1 AND id != ?2 LIMIT 1",
        table.name()
    );
    let mut stmt = conn.prepare(&sql)?;
    let exclude = exclude_id.unwrap_or(-1);

    let mut candidate = base.to_string();
    let mut n = 2;
    while stmt
        .query_row(params![candidate, exclude], |row| row.get::<_, i64>(0))
        .optional()?
        .is_some()
    {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    Ok(candidate)
}

/// Slug to store for a create/update: an explicit slug is kept as given
/// (a clash surfaces as a conflict), a derived one is made unique.
pub fn resolve_slug(
    pool: &DbPool,
    table: SlugTable,
    explicit: Option<&str>,
    source: &str,
    exclude_id: Option<i64>,
) -> Result<String> {
    let base = slug_or_derive(explicit, source);
    if explicit.is_some_and(|s| !s.trim().is_empty()) {
        Ok(base)
    } else {
        unique_slug(pool, table, &base, exclude_id)
    }
}
