use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::BlogConfig;
use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::user::{Session, User};
use crate::rate_limit::{Bucket, RateLimiter};
use crate::security::auth::{self, AuthenticatedUser, ClientIp, Principal};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[post("/login", format = "json", data = "<form>")]
pub fn login(
    pool: &State<DbPool>,
    config: &State<BlogConfig>,
    limiter: &State<RateLimiter>,
    cookies: &CookieJar<'_>,
    client_ip: ClientIp,
    form: Json<LoginRequest>,
) -> Result<Json<Value>> {
    let client = auth::hash_ip(&client_ip.0);
    if !limiter.check_and_record(Bucket::Login, &client) {
        log::warn!("Login rate limit hit");
        return Err(ApiError::TooManyRequests);
    }

    let login = form.login.trim();
    if login.is_empty() || form.password.is_empty() {
        return Err(ApiError::BadRequest("Login and password are required".to_string()));
    }

    let user = User::find_by_login(pool, login)?
        .filter(|u| auth::verify_password(&form.password, &u.password_hash))
        .ok_or(ApiError::Unauthorized)?;

    let session_id = Session::create(pool, user.id, config.session_expiry_hours)?;
    auth::set_session_cookie(cookies, &session_id);
    limiter.reset(Bucket::Login, &client);
    log::info!("User {} signed in", user.username);

    Ok(Json(json!({ "success": true, "user": user })))
}

#[post("/logout")]
pub fn logout(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Result<Json<Value>> {
    if let Some(session_id) = auth::session_id(cookies) {
        Session::destroy(pool, &session_id)?;
    }
    auth::clear_session_cookie(cookies);
    Ok(Json(json!({ "success": true })))
}

#[get("/me")]
pub fn me(current: AuthenticatedUser, principal: Principal) -> Json<Value> {
    Json(json!({
        "user": current.user,
        "capability": format!("{:?}", principal.capability()).to_lowercase(),
    }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, logout, me]
}
