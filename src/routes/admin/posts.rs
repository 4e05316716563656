use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ok, ok_id};
use crate::config::BlogConfig;
use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::post::{Post, PostForm};
use crate::query::{PostFilter, Visibility};
use crate::routes::ListParams;
use crate::security::auth::AdminUser;
use crate::transform;

fn parse_visibility(status: Option<&str>) -> Result<Visibility> {
    match status.map(str::trim).unwrap_or("all") {
        "" | "all" => Ok(Visibility::All),
        "published" => Ok(Visibility::Published),
        "draft" | "drafts" => Ok(Visibility::Drafts),
        other => Err(ApiError::BadRequest(format!("Unknown post status: {}", other))),
    }
}

#[get("/posts?<status>&<params..>")]
pub fn posts_list(
    _admin: AdminUser,
    pool: &State<DbPool>,
    config: &State<BlogConfig>,
    status: Option<&str>,
    params: ListParams,
) -> Result<Json<Value>> {
    let mut query = params
        .query(config, config.list_page_size)
        .visibility(parse_visibility(status)?);
    if let Some(q) = params.search_text() {
        query = query.filtered(PostFilter::Search(q.to_string()));
    }
    let page = transform::summarize_page(pool, query.run(pool)?)?;
    Ok(Json(page.to_json("posts")))
}

#[get("/posts/<id>")]
pub fn post_get(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    let row = Post::find_by_id(pool, id)?.ok_or(ApiError::NotFound("Post"))?;
    let detail = transform::detail(pool, row, Vec::new())?;
    Ok(Json(json!({ "post": detail })))
}

#[post("/posts", format = "json", data = "<form>")]
pub fn post_create(admin: AdminUser, pool: &State<DbPool>, form: Json<PostForm>) -> Result<Json<Value>> {
    let id = Post::create(pool, &form, Some(admin.user.id))?;
    log::info!("Post {} created by {}", id, admin.user.username);
    Ok(Json(ok_id(id)))
}

#[put("/posts/<id>", format = "json", data = "<form>")]
pub fn post_update(_admin: AdminUser, pool: &State<DbPool>, id: i64, form: Json<PostForm>) -> Result<Json<Value>> {
    Post::update(pool, id, &form)?;
    Ok(Json(ok_id(id)))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub published: bool,
}

#[put("/posts/<id>/status", format = "json", data = "<change>")]
pub fn post_status(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
    change: Json<StatusChange>,
) -> Result<Json<Value>> {
    Post::set_published(pool, id, change.published)?;
    Ok(Json(ok_id(id)))
}

#[delete("/posts/<id>")]
pub fn post_delete(admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Post::delete(pool, id)?;
    log::info!("Post {} deleted by {}", id, admin.user.username);
    Ok(Json(ok()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![posts_list, post_get, post_create, post_update, post_status, post_delete]
}
