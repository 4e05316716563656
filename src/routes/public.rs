use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::ListParams;
use crate::config::BlogConfig;
use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::category::Category;
use crate::models::post::Post;
use crate::models::tag::Tag;
use crate::query::{Page, PostFilter};
use crate::transform;

const RELATED_LIMIT: i64 = 3;

// ── Posts ──────────────────────────────────────────────

#[get("/posts?<params..>")]
pub fn posts_list(pool: &State<DbPool>, config: &State<BlogConfig>, params: ListParams) -> Result<Json<Value>> {
    let mut query = params.query(config, config.list_page_size);
    if let Some(q) = params.search_text() {
        query = query.filtered(PostFilter::Search(q.to_string()));
    }
    let page = transform::summarize_page(pool, query.run(pool)?)?;
    Ok(Json(page.to_json("posts")))
}

#[get("/posts/<slug>")]
pub fn post_detail(pool: &State<DbPool>, slug: &str) -> Result<Json<Value>> {
    let mut row = Post::find_published(pool, slug)?.ok_or(ApiError::NotFound("Post"))?;

    match Post::increment_views(pool, row.post.id) {
        Ok(()) => row.post.view_count += 1,
        Err(e) => log::warn!("Failed to bump view count of post {}: {}", row.post.id, e),
    }

    let related = Post::related(pool, row.post.id, RELATED_LIMIT)?;
    let detail = transform::detail(pool, row, related)?;
    Ok(Json(json!({ "post": detail })))
}

// ── Categories ─────────────────────────────────────────

#[get("/categories")]
pub fn categories_list(pool: &State<DbPool>) -> Result<Json<Value>> {
    Ok(Json(json!({ "categories": Category::list(pool)? })))
}

#[get("/categories/<slug>/posts?<params..>")]
pub fn category_posts(
    pool: &State<DbPool>,
    config: &State<BlogConfig>,
    slug: &str,
    params: ListParams,
) -> Result<Json<Value>> {
    let category = Category::find_by_slug(pool, slug)?.ok_or(ApiError::NotFound("Category"))?;
    let query = params
        .query(config, config.category_page_size)
        .filtered(PostFilter::Category(category.slug.clone()));
    let page = transform::summarize_page(pool, query.run(pool)?)?;

    let mut body = page.to_json("posts");
    body["category"] = json!(category);
    Ok(Json(body))
}

// ── Tags ───────────────────────────────────────────────

#[get("/tags")]
pub fn tags_list(pool: &State<DbPool>) -> Result<Json<Value>> {
    Ok(Json(json!({ "tags": Tag::list(pool)? })))
}

#[get("/tags/<slug>/posts?<params..>")]
pub fn tag_posts(
    pool: &State<DbPool>,
    config: &State<BlogConfig>,
    slug: &str,
    params: ListParams,
) -> Result<Json<Value>> {
    let tag = Tag::find_by_slug(pool, slug)?.ok_or(ApiError::NotFound("Tag"))?;
    let query = params
        .query(config, config.tag_page_size)
        .filtered(PostFilter::Tag(tag.slug.clone()));
    let page = transform::summarize_page(pool, query.run(pool)?)?;

    let mut body = page.to_json("posts");
    body["tag"] = json!(tag);
    Ok(Json(body))
}

// ── Search ─────────────────────────────────────────────

#[get("/search?<params..>")]
pub fn search(pool: &State<DbPool>, config: &State<BlogConfig>, params: ListParams) -> Result<Json<Value>> {
    let query = params.query(config, config.search_page_size);

    let Some(text) = params.search_text() else {
        let mut body = Page::<Value>::empty(query.page, query.limit).to_json("posts");
        body["query"] = json!("");
        body["categories"] = json!([]);
        body["tags"] = json!([]);
        return Ok(Json(body));
    };

    let query = query.filtered(PostFilter::Search(text.to_string()));
    let page = transform::summarize_page(pool, query.run(pool)?)?;

    let needle = text.to_lowercase();
    let matches = |name: &str, description: Option<&str>| {
        name.to_lowercase().contains(&needle)
            || description.is_some_and(|d| d.to_lowercase().contains(&needle))
    };
    let categories: Vec<Category> = Category::list(pool)?
        .into_iter()
        .filter(|c| matches(&c.name, c.description.as_deref()))
        .collect();
    let tags: Vec<Tag> = Tag::list(pool)?
        .into_iter()
        .filter(|t| matches(&t.name, t.description.as_deref()))
        .collect();

    let mut body = page.to_json("posts");
    body["query"] = json!(text);
    body["categories"] = json!(categories);
    body["tags"] = json!(tags);
    Ok(Json(body))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        posts_list,
        post_detail,
        categories_list,
        category_posts,
        tags_list,
        tag_posts,
        search
    ]
}
