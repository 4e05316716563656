//! Storage rows to display-shaped objects.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::DbPool;
use crate::error::Result;
use crate::models::category::Category;
use crate::models::post::PostRow;
use crate::models::tag::Tag;
use crate::query::Page;

pub const FALLBACK_AUTHOR: &str = "Author";

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub read_time: i64,
    pub view_count: i64,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub author: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub content: String,
    pub category_list: Vec<Category>,
    pub tag_list: Vec<Tag>,
    pub related: Vec<PostSummary>,
}

/// Full name, else username, else the literal fallback. Blank strings
/// count as missing.
pub fn author_display_name(full_name: Option<&str>, username: Option<&str>) -> String {
    [full_name, username]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(FALLBACK_AUTHOR)
        .to_string()
}

fn names(conn: &Connection, sql: &str, post_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![post_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Reshape one row, flattening its categories and tags to name lists.
pub fn summarize(conn: &Connection, row: PostRow) -> Result<PostSummary> {
    let categories = names(
        conn,
        "SELECT c.name FROM categories c JOIN post_categories pc ON pc.category_id = c.id
         WHERE pc.post_id = ?1 ORDER BY c.name",
        row.post.id,
    )?;
    let tags = names(
        conn,
        "SELECT t.name FROM tags t JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1 ORDER BY t.name",
        row.post.id,
    )?;
    let author = author_display_name(row.author_full_name.as_deref(), row.author_username.as_deref());
    let post = row.post;

    Ok(PostSummary {
        id: post.id,
        title: post.title,
        slug: post.slug,
        excerpt: post.excerpt,
        cover_image: post.cover_image,
        published: post.published,
        published_at: post.published_at,
        read_time: post.read_time,
        view_count: post.view_count,
        categories,
        tags,
        author,
    })
}

pub fn summarize_all(pool: &DbPool, rows: Vec<PostRow>) -> Result<Vec<PostSummary>> {
    let conn = pool.get()?;
    rows.into_iter().map(|row| summarize(&conn, row)).collect()
}

pub fn summarize_page(pool: &DbPool, page: Page<PostRow>) -> Result<Page<PostSummary>> {
    let Page { items, total, page, limit, total_pages } = page;
    Ok(Page {
        items: summarize_all(pool, items)?,
        total,
        page,
        limit,
        total_pages,
    })
}

pub fn detail(pool: &DbPool, row: PostRow, related: Vec<PostRow>) -> Result<PostDetail> {
    let post_id = row.post.id;
    let content = row.post.content.clone();
    let summary = {
        let conn = pool.get()?;
        summarize(&conn, row)?
    };
    Ok(PostDetail {
        summary,
        content,
        category_list: Category::for_post(pool, post_id)?,
        tag_list: Tag::for_post(pool, post_id)?,
        related: summarize_all(pool, related)?,
    })
}
