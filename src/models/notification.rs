use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::DbPool;
use crate::error::{ApiError, Result};

/// Admin inbox entry, e.g. "new comment awaiting moderation".
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl Notification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Notification {
            id: row.get("id")?,
            kind: row.get("kind")?,
            message: row.get("message")?,
            link: row.get("link")?,
            is_read: row.get("is_read")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn create(pool: &DbPool, kind: &str, message: &str, link: Option<&str>) -> Result<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO notifications (kind, message, link) VALUES (?1, ?2, ?3)",
            params![kind, message, link],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list(pool: &DbPool, unread_only: bool, limit: i64) -> Result<Vec<Self>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM notifications WHERE (?1 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![unread_only, limit], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn unread_count(pool: &DbPool) -> Result<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE is_read = 0",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn mark_read(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        if conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", params![id])? == 0 {
            return Err(ApiError::NotFound("Notification"));
        }
        Ok(())
    }
}
