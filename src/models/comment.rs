use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{ApiError, Result};

pub const STATUSES: [&str; 3] = ["pending", "approved", "spam"];

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub body: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentForm {
    pub author_name: String,
    pub author_email: Option<String>,
    pub body: String,
}

impl Comment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Comment {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            author_name: row.get("author_name")?,
            author_email: row.get("author_email")?,
            body: row.get("body")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row("SELECT * FROM comments WHERE id = ?1", params![id], Self::from_row)
            .optional()?)
    }

    /// Approved comments on a post, oldest first. Emails are withheld.
    pub fn approved_for_post(pool: &DbPool, post_id: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM comments WHERE post_id = ?1 AND status = 'approved'
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![post_id], |row| {
            Self::from_row(row).map(|mut c| {
                c.author_email = None;
                c
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list(pool: &DbPool, status: Option<&str>, limit: i64, offset: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM comments WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![status, limit, offset], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn count(pool: &DbPool, status: Option<&str>) -> Result<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE (?1 IS NULL OR status = ?1)",
            params![status],
            |row| row.get(0),
        )?)
    }

    /// Validate and store a reader comment with the given initial status.
    pub fn create(pool: &DbPool, post_id: i64, form: &CommentForm, status: &str) -> Result<i64> {
        let name = form.author_name.trim();
        let body = form.body.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Name is required".to_string()));
        }
        if body.is_empty() {
            return Err(ApiError::BadRequest("Comment body is required".to_string()));
        }
        let email = form
            .author_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        if email.is_some_and(|e| !e.contains('@')) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }

        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO comments (post_id, author_name, author_email, body, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![post_id, name, email, body, status],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_status(pool: &DbPool, id: i64, status: &str) -> Result<()> {
        if !STATUSES.contains(&status) {
            return Err(ApiError::BadRequest(format!("Unknown comment status: {}", status)));
        }
        let conn = pool.get()?;
        if conn.execute(
            "UPDATE comments SET status = ?1 WHERE id = ?2",
            params![status, id],
        )? == 0
        {
            return Err(ApiError::NotFound("Comment"));
        }
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        if conn.execute("DELETE FROM comments WHERE id = ?1", params![id])? == 0 {
            return Err(ApiError::NotFound("Comment"));
        }
        Ok(())
    }
}
