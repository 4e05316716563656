use chrono::Local;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::ok_id;
use crate::analytics::normalize_path;
use crate::db::DbPool;
use crate::error::Result;
use crate::models::analytics::PageView;
use crate::models::comment::Comment;
use crate::models::notification::Notification;
use crate::query::{PostQuery, Visibility};
use crate::security::auth::AdminUser;

const MAX_DAYS: i64 = 365;
const TOP_PAGES: i64 = 10;

// ── Dashboard ──────────────────────────────────────────

#[get("/dashboard")]
pub fn dashboard(_admin: AdminUser, pool: &State<DbPool>) -> Result<Json<Value>> {
    let (published, drafts) = {
        let conn = pool.get()?;
        let count = |v| PostQuery::published(None, 1).visibility(v).count(&conn);
        (count(Visibility::Published)?, count(Visibility::Drafts)?)
    };

    Ok(Json(json!({
        "postsPublished": published,
        "postsDraft": drafts,
        "commentsPending": Comment::count(pool, Some("pending"))?,
        "notificationsUnread": Notification::unread_count(pool)?,
        "totalViews": PageView::total_views(pool, None)?,
    })))
}

// ── Analytics ──────────────────────────────────────────

#[get("/analytics?<days>&<path>")]
pub fn analytics(
    _admin: AdminUser,
    pool: &State<DbPool>,
    days: Option<i64>,
    path: Option<&str>,
) -> Result<Json<Value>> {
    let days = days.unwrap_or(30).clamp(1, MAX_DAYS);
    let path = path.map(normalize_path).filter(|p| !p.is_empty());
    let today = Local::now().date_naive();

    Ok(Json(json!({
        "days": days,
        "path": path,
        "daily": PageView::daily(pool, today, days, path.as_deref())?,
        "topPages": PageView::top_pages(pool, today, days, TOP_PAGES)?,
        "totalViews": PageView::total_views(pool, path.as_deref())?,
    })))
}

// ── Notifications ──────────────────────────────────────

#[get("/notifications?<unread>")]
pub fn notifications_list(_admin: AdminUser, pool: &State<DbPool>, unread: Option<bool>) -> Result<Json<Value>> {
    Ok(Json(json!({
        "notifications": Notification::list(pool, unread.unwrap_or(false), 50)?,
        "unread": Notification::unread_count(pool)?,
    })))
}

#[post("/notifications/<id>/read")]
pub fn notification_read(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Notification::mark_read(pool, id)?;
    Ok(Json(ok_id(id)))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![dashboard, analytics, notifications_list, notification_read]
}
