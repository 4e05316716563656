use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::slugs::{self, SlugTable};

const WORDS_PER_MINUTE: usize = 200;

/// Columns selected for every post listing: the post plus the two author
/// fields needed for the display name.
pub const POST_COLUMNS: &str = "p.*, u.username AS author_username, u.full_name AS author_full_name
    FROM posts p LEFT JOIN users u ON u.id = p.author_id";

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub read_time: i64,
    pub view_count: i64,
    pub author_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A post row joined with its author's name fields.
#[derive(Debug, Clone)]
pub struct PostRow {
    pub post: Post,
    pub author_username: Option<String>,
    pub author_full_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PostForm {
    pub title: String,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub published: bool,
    /// `%Y-%m-%dT%H:%M` or `%Y-%m-%d %H:%M:%S`
    pub published_at: Option<String>,
    pub category_ids: Vec<i64>,
    pub tag_ids: Vec<i64>,
}

impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            excerpt: row.get("excerpt")?,
            content: row.get("content")?,
            cover_image: row.get("cover_image")?,
            published: row.get("published")?,
            published_at: row.get("published_at")?,
            read_time: row.get("read_time")?,
            view_count: row.get("view_count")?,
            author_id: row.get("author_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<PostRow>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} WHERE p.id = ?1", POST_COLUMNS),
                params![id],
                PostRow::from_row,
            )
            .optional()?)
    }

    /// Published post by slug; drafts are invisible to public readers.
    pub fn find_published(pool: &DbPool, slug: &str) -> Result<Option<PostRow>> {
        let conn = pool.get()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} WHERE p.slug = ?1 AND p.published = 1", POST_COLUMNS),
                params![slug],
                PostRow::from_row,
            )
            .optional()?)
    }

    pub fn create(pool: &DbPool, form: &PostForm, author_id: Option<i64>) -> Result<i64> {
        let title = validate_title(&form.title)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Posts, form.slug.as_deref(), title, None)?;
        let published_at = resolve_published_at(form, None)?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (title, slug, excerpt, content, cover_image, published, published_at, read_time, author_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                title,
                slug,
                form.excerpt,
                form.content,
                form.cover_image,
                form.published,
                published_at,
                read_time(&form.content),
                author_id,
            ],
        )
        .map_err(|e| ApiError::unique_violation(e, "Post slug already exists"))?;
        let id = tx.last_insert_rowid();
        set_relations(&tx, id, &form.category_ids, &form.tag_ids)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn update(pool: &DbPool, id: i64, form: &PostForm) -> Result<()> {
        let existing = Self::find_by_id(pool, id)?.ok_or(ApiError::NotFound("Post"))?;
        let title = validate_title(&form.title)?;
        let slug = slugs::resolve_slug(pool, SlugTable::Posts, form.slug.as_deref(), title, Some(id))?;
        let published_at = resolve_published_at(form, existing.post.published_at)?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE posts SET title = ?1, slug = ?2, excerpt = ?3, content = ?4, cover_image = ?5,
             published = ?6, published_at = ?7, read_time = ?8, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?9",
            params![
                title,
                slug,
                form.excerpt,
                form.content,
                form.cover_image,
                form.published,
                published_at,
                read_time(&form.content),
                id,
            ],
        )
        .map_err(|e| ApiError::unique_violation(e, "Post slug already exists"))?;
        set_relations(&tx, id, &form.category_ids, &form.tag_ids)?;
        tx.commit()?;
        Ok(())
    }

    /// Flip the published flag, stamping `published_at` on first publish.
    pub fn set_published(pool: &DbPool, id: i64, published: bool) -> Result<()> {
        let conn = pool.get()?;
        let now = Utc::now().naive_utc();
        let changed = conn.execute(
            "UPDATE posts SET published = ?1,
             published_at = CASE WHEN ?1 = 1 AND published_at IS NULL THEN ?2 ELSE published_at END,
             updated_at = CURRENT_TIMESTAMP
             WHERE id = ?3",
            params![published, now, id],
        )?;
        if changed == 0 {
            return Err(ApiError::NotFound("Post"));
        }
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        if conn.execute("DELETE FROM posts WHERE id = ?1", params![id])? == 0 {
            return Err(ApiError::NotFound("Post"));
        }
        Ok(())
    }

    pub fn increment_views(pool: &DbPool, id: i64) -> Result<()> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Published posts sharing categories or tags with `post_id`, most
    /// overlap first, then newest.
    pub fn related(pool: &DbPool, post_id: i64, limit: i64) -> Result<Vec<PostRow>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} JOIN (
                SELECT post_id FROM post_categories
                WHERE category_id IN (SELECT category_id FROM post_categories WHERE post_id = ?1)
                UNION ALL
                SELECT post_id FROM post_tags
                WHERE tag_id IN (SELECT tag_id FROM post_tags WHERE post_id = ?1)
             ) shared ON shared.post_id = p.id
             WHERE p.published = 1 AND p.id != ?1
             GROUP BY p.id
             ORDER BY COUNT(*) DESC, p.published_at DESC
             LIMIT ?2",
            POST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![post_id, limit], PostRow::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

impl PostRow {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PostRow {
            post: Post::from_row(row)?,
            author_username: row.get("author_username")?,
            author_full_name: row.get("author_full_name")?,
        })
    }
}

/// Estimated minutes to read `content`, never less than one.
pub fn read_time(content: &str) -> i64 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}

fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }
    Ok(title)
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn resolve_published_at(form: &PostForm, current: Option<NaiveDateTime>) -> Result<Option<NaiveDateTime>> {
    let requested = match form.published_at.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Some(
            parse_datetime(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid publishedAt: {}", s)))?,
        ),
        _ => None,
    };
    Ok(match (requested, current) {
        (Some(at), _) => Some(at),
        (None, Some(at)) => Some(at),
        (None, None) if form.published => Some(Utc::now().naive_utc()),
        (None, None) => None,
    })
}

fn set_relations(tx: &Transaction, post_id: i64, category_ids: &[i64], tag_ids: &[i64]) -> Result<()> {
    tx.execute("DELETE FROM post_categories WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM post_tags WHERE post_id = ?1", params![post_id])?;

    for category_id in category_ids {
        tx.execute(
            "INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?1, ?2)",
            params![post_id, category_id],
        )
        .map_err(|e| reference_error(e, "Unknown category id"))?;
    }
    for tag_id in tag_ids {
        tx.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
            params![post_id, tag_id],
        )
        .map_err(|e| reference_error(e, "Unknown tag id"))?;
    }
    Ok(())
}

fn reference_error(err: rusqlite::Error, message: &str) -> ApiError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ApiError::BadRequest(message.to_string())
        }
        other => ApiError::Database(other),
    }
}
