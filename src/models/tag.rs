use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::category::validate_name;
use crate::slugs::{self, SlugTable};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub post_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct TagForm {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

const SELECT: &str = "SELECT t.*,
    (SELECT COUNT(*) FROM post_tags pt JOIN posts p ON p.id = pt.post_id
     WHERE pt.tag_id = t.id AND p.published = 1) AS post_count
    FROM tags t";

impl Tag {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Tag {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            color: row.get("color")?,
            post_count: row.get("post_count")?,
        })
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Result<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(&format!("{} WHERE t.slug = ?1", SELECT), params![slug], Self::from_row)
            .optional()?)
    }

    /// All tags, most used first.
    pub fn list(pool: &DbPool) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY post_count DESC, t.name", SELECT))?;
        let rows = stmt.query_map([], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn for_post(pool: &DbPool, post_id: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} JOIN post_tags link ON link.tag_id = t.id
             WHERE link.post_id = ?1 ORDER BY t.name",
            SELECT
        ))?;
        let rows = stmt.query_map(params![post_id], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn create(pool: &DbPool, form: &TagForm) -> Result<i64> {
        let name = validate_name(&form.name)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Tags, form.slug.as_deref(), name, None)?;
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO tags (name, slug, description, color) VALUES (?1, ?2, ?3, ?4)",
            params![name, slug, form.description, form.color],
        )
        .map_err(|e| ApiError::unique_violation(e, "Tag slug already exists"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &TagForm) -> Result<()> {
        let name = validate_name(&form.name)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Tags, form.slug.as_deref(), name, Some(id))?;
        let conn = pool.get()?;
        let changed = conn
            .execute(
                "UPDATE tags SET name = ?1, slug = ?2, description = ?3, color = ?4 WHERE id = ?5",
                params![name, slug, form.description, form.color, id],
            )
            .map_err(|e| ApiError::unique_violation(e, "Tag slug already exists"))?;
        if changed == 0 {
            return Err(ApiError::NotFound("Tag"));
        }
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        if conn.execute("DELETE FROM tags WHERE id = ?1", params![id])? == 0 {
            return Err(ApiError::NotFound("Tag"));
        }
        Ok(())
    }
}
