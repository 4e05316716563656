use rocket::serde::json::{Error as JsonError, Json};
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analytics::{normalize_path, ViewCounter};
use crate::db::DbPool;
use crate::email;
use crate::error::{ApiError, Result};
use crate::models::analytics::PageView;
use crate::models::comment::{Comment, CommentForm};
use crate::models::notification::Notification;
use crate::models::post::Post;
use crate::models::settings::Setting;
use crate::rate_limit::{Bucket, RateLimiter};
use crate::security::auth::{self, ClientIp};

// ── Page views ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPayload {
    pub page_path: Option<String>,
}

/// Count a page view. Recording never fails the request; only a missing
/// path (400) or an unreadable body (500) does.
#[post("/views", data = "<payload>")]
pub fn record_view(
    pool: &State<DbPool>,
    counter: &State<ViewCounter>,
    payload: std::result::Result<Json<ViewPayload>, JsonError<'_>>,
) -> Result<Json<Value>> {
    let payload = payload.map_err(|e| ApiError::Internal(format!("Unreadable view payload: {}", e)))?;
    let path = payload
        .page_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Page path is required".to_string()))?;

    counter.track(pool, path);
    Ok(Json(json!({ "success": true })))
}

#[get("/views?<path>")]
pub fn view_count(pool: &State<DbPool>, path: Option<&str>) -> Result<Json<Value>> {
    let path = path
        .map(normalize_path)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Page path is required".to_string()))?;
    let total = PageView::total_views(pool, Some(&path))?;
    Ok(Json(json!({ "path": path, "totalViews": total })))
}

// ── Comments ───────────────────────────────────────────

#[get("/posts/<slug>/comments")]
pub fn comments_list(pool: &State<DbPool>, slug: &str) -> Result<Json<Value>> {
    let row = Post::find_published(pool, slug)?.ok_or(ApiError::NotFound("Post"))?;
    let comments = Comment::approved_for_post(pool, row.post.id)?;
    Ok(Json(json!({ "comments": comments })))
}

#[post("/posts/<slug>/comments", format = "json", data = "<form>")]
pub fn comment_submit(
    pool: &State<DbPool>,
    limiter: &State<RateLimiter>,
    client_ip: ClientIp,
    slug: &str,
    form: Json<CommentForm>,
) -> Result<Json<Value>> {
    if !Setting::get_bool(pool, "comments_enabled") {
        return Err(ApiError::BadRequest("Comments are disabled".to_string()));
    }
    let row = Post::find_published(pool, slug)?.ok_or(ApiError::NotFound("Post"))?;

    if !limiter.check_and_record(Bucket::Comment, &auth::hash_ip(&client_ip.0)) {
        return Err(ApiError::TooManyRequests);
    }

    let auto_approve = Setting::get_or(pool, "comments_moderation", "manual") == "auto";
    let status = if auto_approve { "approved" } else { "pending" };
    let id = Comment::create(pool, row.post.id, &form, status)?;

    // The comment is stored; nothing below may fail the request
    if let Ok(Some(comment)) = Comment::find_by_id(pool, id) {
        let message = format!("{} commented on \"{}\"", comment.author_name, row.post.title);
        let link = format!("/blog/{}", row.post.slug);
        if let Err(e) = Notification::create(pool, "comment", &message, Some(&link)) {
            log::warn!("Failed to create comment notification: {}", e);
        }
        if let Some(mail) = email::comment_notification(pool, &row.post.title, &comment) {
            email::dispatch(pool, mail);
        }
    }

    Ok(Json(json!({
        "success": true,
        "id": id,
        "status": status,
        "message": if auto_approve { "Comment posted" } else { "Comment submitted for moderation" },
    })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![record_view, view_count, comments_list, comment_submit]
}
