use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::slugs::{self, SlugTable};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Published posts filed under this category.
    pub post_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

const SELECT: &str = "SELECT c.*,
    (SELECT COUNT(*) FROM post_categories pc JOIN posts p ON p.id = pc.post_id
     WHERE pc.category_id = c.id AND p.published = 1) AS post_count
    FROM categories c";

impl Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            color: row.get("color")?,
            icon: row.get("icon")?,
            post_count: row.get("post_count")?,
        })
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Result<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(&format!("{} WHERE c.slug = ?1", SELECT), params![slug], Self::from_row)
            .optional()?)
    }

    pub fn list(pool: &DbPool) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY c.name", SELECT))?;
        let rows = stmt.query_map([], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn for_post(pool: &DbPool, post_id: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} JOIN post_categories link ON link.category_id = c.id
             WHERE link.post_id = ?1 ORDER BY c.name",
            SELECT
        ))?;
        let rows = stmt.query_map(params![post_id], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn create(pool: &DbPool, form: &CategoryForm) -> Result<i64> {
        let name = validate_name(&form.name)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Categories, form.slug.as_deref(), name, None)?;

        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO categories (name, slug, description, color, icon) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, slug, form.description, form.color, form.icon],
        )
        .map_err(|e| ApiError::unique_violation(e, "Category slug already exists"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &CategoryForm) -> Result<()> {
        let name = validate_name(&form.name)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Categories, form.slug.as_deref(), name, Some(id))?;
        let conn = pool.get()?;
        let changed = conn
            .execute(
                "UPDATE categories SET name = ?1, slug = ?2, description = ?3, color = ?4, icon = ?5
                 WHERE id = ?6",
                params![name, slug, form.description, form.color, form.icon, id],
            )
            .map_err(|e| ApiError::unique_violation(e, "Category slug already exists"))?;
        if changed == 0 {
            return Err(ApiError::NotFound("Category"));
        }
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        if conn.execute("DELETE FROM categories WHERE id = ?1", params![id])? == 0 {
            return Err(ApiError::NotFound("Category"));
        }
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    Ok(name)
}
