use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::DbPool;
use crate::error::Result;

/// Per-day view counters, one `page_views` row per `(page_path, date)`.
pub struct PageView;

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
}

impl PageView {
    /// Whether the counter table has been provisioned.
    pub fn table_exists(conn: &Connection) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'page_views'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Add one view to the `(path, date)` bucket, creating it at 1.
    /// Single statement, so concurrent hits on the same bucket never lose
    /// an increment.
    pub fn increment(conn: &Connection, path: &str, date: NaiveDate) -> Result<()> {
        conn.execute(
            "INSERT INTO page_views (page_path, date, view_count) VALUES (?1, ?2, 1)
             ON CONFLICT(page_path, date) DO UPDATE SET view_count = view_count + 1",
            params![path, date],
        )?;
        Ok(())
    }

    /// Sum of all buckets, optionally for a single path.
    pub fn total_views(pool: &DbPool, path: Option<&str>) -> Result<i64> {
        let conn = pool.get()?;
        let total = match path {
            Some(p) => conn.query_row(
                "SELECT COALESCE(SUM(view_count), 0) FROM page_views WHERE page_path = ?1",
                params![p],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(SUM(view_count), 0) FROM page_views",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(total)
    }

    /// Per-day totals for the `days` days ending at `today`, oldest first.
    /// Days without views are omitted.
    pub fn daily(pool: &DbPool, today: NaiveDate, days: i64, path: Option<&str>) -> Result<Vec<DailyCount>> {
        let conn = pool.get()?;
        let from = today - Duration::days(days.max(1) - 1);
        let mut stmt = conn.prepare(
            "SELECT date, SUM(view_count) FROM page_views
             WHERE date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR page_path = ?3)
             GROUP BY date ORDER BY date",
        )?;
        let rows = stmt.query_map(params![from, today, path], |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Most viewed paths over the `days` days ending at `today`.
    pub fn top_pages(pool: &DbPool, today: NaiveDate, days: i64, limit: i64) -> Result<Vec<PathCount>> {
        let conn = pool.get()?;
        let from = today - Duration::days(days.max(1) - 1);
        let mut stmt = conn.prepare(
            "SELECT page_path, SUM(view_count) AS total FROM page_views
             WHERE date BETWEEN ?1 AND ?2
             GROUP BY page_path ORDER BY total DESC, page_path LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![from, today, limit], |row| {
            Ok(PathCount {
                path: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
