use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;

use crate::db::DbPool;
use crate::error::Result;
use crate::models::analytics::PageView;

/// Individual post pages: `/blog/<slug>`.
static POST_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/blog/[^/]+$").expect("valid post path pattern"));

/// What a `record` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Counted,
    /// Path is neither allow-listed nor a post page.
    NotCountable,
    /// `page_views` has not been provisioned yet.
    TableMissing,
}

/// Per-day page view counter for an allow-listed set of paths.
pub struct ViewCounter {
    allowed: HashSet<String>,
}

impl ViewCounter {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ViewCounter {
            allowed: paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_countable(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.allowed.contains(&path) || POST_PATH.is_match(&path)
    }

    /// Count one view of `path` in today's local-day bucket.
    pub fn record(&self, pool: &DbPool, path: &str) -> Result<Recorded> {
        self.record_on(pool, path, Local::now().date_naive())
    }

    pub fn record_on(&self, pool: &DbPool, path: &str, day: NaiveDate) -> Result<Recorded> {
        let path = normalize_path(path);
        if !self.is_countable(&path) {
            return Ok(Recorded::NotCountable);
        }

        let conn = pool.get()?;
        if !PageView::table_exists(&conn)? {
            return Ok(Recorded::TableMissing);
        }
        PageView::increment(&conn, &path, day)?;
        Ok(Recorded::Counted)
    }

    /// Fire-and-forget variant: failures are logged, never returned.
    pub fn track(&self, pool: &DbPool, path: &str) {
        match self.record(pool, path) {
            Ok(Recorded::TableMissing) => {
                log::debug!("page_views table missing, skipped view of {}", path)
            }
            Ok(_) => {}
            Err(e) => log::warn!("Failed to record view of {}: {}", path, e),
        }
    }
}

/// Drop query/fragment, trim whitespace and a trailing slash (except on `/`).
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        if path.starts_with('/') {
            "/".to_string()
        } else {
            String::new()
        }
    } else {
        trimmed.to_string()
    }
}
