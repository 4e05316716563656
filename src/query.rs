//! Paginated, filtered post queries for listing, category, tag and search
//! pages. Every query runs as two statements: a `COUNT(*)` for the total and
//! a `LIMIT/OFFSET` fetch for the requested slice.

use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::db::DbPool;
use crate::error::Result;
use crate::models::post::{PostRow, POST_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    Title,
    ReadTime,
    Views,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl SortKey {
    /// Accepts the public sort names and the column-style names used by
    /// `sortBy`. Unknown values yield `None` so callers can fall back.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "newest" | "publishedAt" | "published_at" | "date" => Some(SortKey::Newest),
            "oldest" => Some(SortKey::Oldest),
            "title" => Some(SortKey::Title),
            "readTime" | "read_time" | "readtime" => Some(SortKey::ReadTime),
            "views" | "viewCount" | "view_count" | "popular" => Some(SortKey::Views),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::Newest | SortKey::Oldest => "p.published_at",
            SortKey::Title => "p.title",
            SortKey::ReadTime => "p.read_time",
            SortKey::Views => "p.view_count",
        }
    }

    fn default_order(self) -> Order {
        match self {
            SortKey::Newest | SortKey::Views => Order::Desc,
            SortKey::Oldest | SortKey::Title | SortKey::ReadTime => Order::Asc,
        }
    }
}

impl Order {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Order::Asc),
            "desc" => Some(Order::Desc),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PostFilter {
    #[default]
    None,
    Category(String),
    Tag(String),
    /// Case-insensitive substring match over title, slug, excerpt and the
    /// names/descriptions of the post's categories and tags.
    Search(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Published,
    Drafts,
    All,
}

#[derive(Debug, Clone)]
pub struct PostQuery {
    pub page: i64,
    pub limit: i64,
    pub sort: SortKey,
    pub order: Option<Order>,
    pub filter: PostFilter,
    pub visibility: Visibility,
}

/// One page of results plus the numbers needed to render pagination.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// `max(1, ceil(total / limit))`
pub fn total_pages(total: i64, limit: i64) -> i64 {
    let limit = limit.max(1);
    ((total + limit - 1) / limit).max(1)
}

/// Rows to skip for a 1-based page. Saturates at `i64::MAX` so a page
/// number too large to multiply still reads past the end.
pub fn page_offset(page: i64, limit: i64) -> i64 {
    (page.max(1) - 1).checked_mul(limit.max(1)).unwrap_or(i64::MAX)
}

impl PostQuery {
    /// Published posts, newest first. Pages below 1 are coerced to 1.
    pub fn published(page: Option<i64>, limit: i64) -> Self {
        PostQuery {
            page: page.unwrap_or(1).max(1),
            limit: limit.max(1),
            sort: SortKey::default(),
            order: None,
            filter: PostFilter::None,
            visibility: Visibility::Published,
        }
    }

    pub fn sorted(mut self, sort: SortKey, order: Option<Order>) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn filtered(mut self, filter: PostFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.limit)
    }

    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        match self.visibility {
            Visibility::Published => conditions.push("p.published = 1"),
            Visibility::Drafts => conditions.push("p.published = 0"),
            Visibility::All => {}
        }

        match &self.filter {
            PostFilter::None => {}
            PostFilter::Category(slug) => {
                conditions.push(
                    "EXISTS (SELECT 1 FROM post_categories pc JOIN categories c ON c.id = pc.category_id
                     WHERE pc.post_id = p.id AND c.slug = ?)",
                );
                params.push(Box::new(slug.clone()));
            }
            PostFilter::Tag(slug) => {
                conditions.push(
                    "EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                     WHERE pt.post_id = p.id AND t.slug = ?)",
                );
                params.push(Box::new(slug.clone()));
            }
            PostFilter::Search(text) => {
                conditions.push(
                    "(LOWER(p.title) LIKE ?1 ESCAPE '\\'
                      OR LOWER(p.slug) LIKE ?1 ESCAPE '\\'
                      OR LOWER(COALESCE(p.excerpt, '')) LIKE ?1 ESCAPE '\\'
                      OR EXISTS (SELECT 1 FROM post_categories pc JOIN categories c ON c.id = pc.category_id
                                 WHERE pc.post_id = p.id
                                 AND (LOWER(c.name) LIKE ?1 ESCAPE '\\'
                                      OR LOWER(COALESCE(c.description, '')) LIKE ?1 ESCAPE '\\'))
                      OR EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                                 WHERE pt.post_id = p.id
                                 AND (LOWER(t.name) LIKE ?1 ESCAPE '\\'
                                      OR LOWER(COALESCE(t.description, '')) LIKE ?1 ESCAPE '\\')))",
                );
                params.push(Box::new(like_pattern(text)));
            }
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (sql, params)
    }

    fn order_clause(&self) -> String {
        let order = self.order.unwrap_or_else(|| self.sort.default_order());
        format!("ORDER BY {} {}", self.sort.column(), order.sql())
    }

    pub fn count(&self, conn: &Connection) -> Result<i64> {
        let (where_sql, params) = self.where_clause();
        let sql = format!("SELECT COUNT(*) FROM posts p {}", where_sql);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?)
    }

    pub fn fetch(&self, conn: &Connection) -> Result<Vec<PostRow>> {
        let (where_sql, mut params) = self.where_clause();
        // Positional placeholders after the filter's own parameter
        let next = params.len() + 1;
        let sql = format!(
            "SELECT {} {} {} LIMIT ?{} OFFSET ?{}",
            POST_COLUMNS,
            where_sql,
            self.order_clause(),
            next,
            next + 1
        );
        params.push(Box::new(self.limit.max(1)));
        params.push(Box::new(self.offset()));

        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(refs.as_slice(), PostRow::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Count plus page fetch. A page past the end yields an empty slice.
    pub fn run(&self, pool: &DbPool) -> Result<Page<PostRow>> {
        let conn = pool.get()?;
        let total = self.count(&conn)?;
        let items = self.fetch(&conn)?;
        Ok(Page {
            items,
            total,
            page: self.page.max(1),
            limit: self.limit.max(1),
            total_pages: total_pages(total, self.limit),
        })
    }
}

impl<T> Page<T> {
    pub fn empty(page: i64, limit: i64) -> Self {
        Page {
            items: Vec::new(),
            total: 0,
            page: page.max(1),
            limit: limit.max(1),
            total_pages: 1,
        }
    }
}

impl<T: Serialize> Page<T> {
    /// Response body with the items under `key` and camelCase paging fields.
    pub fn to_json(&self, key: &str) -> Value {
        let mut body = Map::new();
        body.insert(key.to_string(), json!(self.items));
        body.insert("total".into(), json!(self.total));
        body.insert("page".into(), json!(self.page));
        body.insert("limit".into(), json!(self.limit));
        body.insert("totalPages".into(), json!(self.total_pages));
        Value::Object(body)
    }
}

/// Lowercased `%text%` with LIKE wildcards escaped.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.trim().to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
