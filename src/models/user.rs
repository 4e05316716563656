use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::db::DbPool;
use crate::error::Result;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String, // admin, user
    pub created_at: NaiveDateTime,
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: String,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            password_hash: row.get("password_hash")?,
            role: row.get("role")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Look a user up by username or email.
    pub fn find_by_login(pool: &DbPool, login: &str) -> Result<Option<Self>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE username = ?1 OR email = ?1 COLLATE NOCASE",
                params![login.trim()],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn count(pool: &DbPool) -> Result<i64> {
        let conn = pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn create(pool: &DbPool, user: &NewUser) -> Result<i64> {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO users (username, email, full_name, password_hash, role)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.username, user.email, user.full_name, user.password_hash, user.role],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

// ── Sessions ──

pub struct Session;

impl Session {
    pub fn create(pool: &DbPool, user_id: i64, expiry_hours: i64) -> Result<String> {
        let conn = pool.get()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let expires = now + Duration::hours(expiry_hours.max(1));

        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_id, now, expires],
        )?;
        Ok(session_id)
    }

    /// The user behind a session that has not expired yet.
    pub fn user(pool: &DbPool, session_id: &str) -> Result<Option<User>> {
        let conn = pool.get()?;
        let now = Utc::now().naive_utc();
        Ok(conn
            .query_row(
                "SELECT u.* FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1 AND s.expires_at > ?2",
                params![session_id, now],
                User::from_row,
            )
            .optional()?)
    }

    pub fn destroy(pool: &DbPool, session_id: &str) -> Result<()> {
        let conn = pool.get()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }

    pub fn cleanup_expired(pool: &DbPool) -> Result<usize> {
        let conn = pool.get()?;
        let now = Utc::now().naive_utc();
        Ok(conn.execute("DELETE FROM sessions WHERE expires_at < ?1", params![now])?)
    }
}
