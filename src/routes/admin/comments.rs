use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ok, ok_id};
use crate::db::DbPool;
use crate::email;
use crate::error::{ApiError, Result};
use crate::models::comment::{Comment, STATUSES};
use crate::models::post::Post;
use crate::query::{page_offset, total_pages};
use crate::security::auth::AdminUser;

const PER_PAGE: i64 = 20;

#[get("/comments?<status>&<page>")]
pub fn comments_list(
    _admin: AdminUser,
    pool: &State<DbPool>,
    status: Option<&str>,
    page: Option<i64>,
) -> Result<Json<Value>> {
    let status = status.map(str::trim).filter(|s| !s.is_empty() && *s != "all");
    if let Some(s) = status {
        if !STATUSES.contains(&s) {
            return Err(ApiError::BadRequest(format!("Unknown comment status: {}", s)));
        }
    }
    let page = page.unwrap_or(1).max(1);
    let comments = Comment::list(pool, status, PER_PAGE, page_offset(page, PER_PAGE))?;
    let total = Comment::count(pool, status)?;

    Ok(Json(json!({
        "comments": comments,
        "total": total,
        "page": page,
        "limit": PER_PAGE,
        "totalPages": total_pages(total, PER_PAGE),
    })))
}

#[post("/comments/<id>/approve")]
pub fn comment_approve(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Comment::update_status(pool, id, "approved")?;
    Ok(Json(ok_id(id)))
}

#[post("/comments/<id>/spam")]
pub fn comment_spam(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Comment::update_status(pool, id, "spam")?;
    Ok(Json(ok_id(id)))
}

#[delete("/comments/<id>")]
pub fn comment_delete(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Comment::delete(pool, id)?;
    Ok(Json(ok()))
}

#[derive(Debug, Deserialize)]
pub struct ReplyForm {
    pub body: String,
}

/// Email a reply to the commenter. Replying also approves the comment.
#[post("/comments/<id>/reply", format = "json", data = "<form>")]
pub fn comment_reply(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
    form: Json<ReplyForm>,
) -> Result<Json<Value>> {
    let reply = form.body.trim();
    if reply.is_empty() {
        return Err(ApiError::BadRequest("Reply body is required".to_string()));
    }
    let comment = Comment::find_by_id(pool, id)?.ok_or(ApiError::NotFound("Comment"))?;
    let post = Post::find_by_id(pool, comment.post_id)?.ok_or(ApiError::NotFound("Post"))?;

    let mail = email::comment_reply(pool, &post.post.title, &comment, reply)
        .ok_or_else(|| ApiError::BadRequest("Commenter left no email address".to_string()))?;
    if comment.status != "approved" {
        Comment::update_status(pool, id, "approved")?;
    }
    email::dispatch(pool, mail);

    Ok(Json(ok_id(id)))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![comments_list, comment_approve, comment_spam, comment_delete, comment_reply]
}
