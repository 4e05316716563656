use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use sha2::{Digest, Sha256};

use crate::config::BlogConfig;
use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::user::{Session, User};

const SESSION_COOKIE: &str = "quillpost_session";

// ── Client IP request guard ──

/// Client address. Forwarded headers (first `X-Forwarded-For` hop, then
/// `X-Real-IP`) are honored only with `trust_proxy_headers`; otherwise any
/// client could pick its own rate-limit bucket.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let trust_proxy = request
            .rocket()
            .state::<BlogConfig>()
            .map(|config| config.trust_proxy_headers)
            .unwrap_or(false);

        let forwarded = if trust_proxy {
            let headers = request.headers();
            headers
                .get_one("X-Forwarded-For")
                .and_then(|v| v.split(',').next())
                .or_else(|| headers.get_one("X-Real-IP"))
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| request.remote().map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

// ── Capabilities ──

/// What a request is allowed to do, from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Anonymous,
    Authenticated,
    Admin,
}

/// The session user behind a request, if any. Resolved once per request.
#[derive(Debug, Clone, Default)]
pub struct Principal(pub Option<User>);

impl Principal {
    pub fn capability(&self) -> Capability {
        match &self.0 {
            Some(user) if user.is_admin() => Capability::Admin,
            Some(_) => Capability::Authenticated,
            None => Capability::Anonymous,
        }
    }
}

/// The single authorization check every gated handler goes through.
pub fn authorize(principal: &Principal, needed: Capability) -> Result<Option<User>> {
    if principal.capability() >= needed {
        Ok(principal.0.clone())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let principal = request
            .local_cache_async(async { resolve_principal(request).await })
            .await;
        Outcome::Success(principal.clone())
    }
}

async fn resolve_principal(request: &Request<'_>) -> Principal {
    let Some(pool) = request.guard::<&State<DbPool>>().await.succeeded() else {
        return Principal::default();
    };
    let cookies = request.cookies();
    let Some(session_id) = cookies.get_private(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Principal::default();
    };

    match Session::user(pool, &session_id) {
        Ok(Some(user)) => Principal(Some(user)),
        Ok(None) => {
            cookies.remove_private(Cookie::from(SESSION_COOKIE));
            Principal::default()
        }
        Err(e) => {
            log::warn!("Session lookup failed: {}", e);
            Principal::default()
        }
    }
}

async fn guard(request: &Request<'_>, needed: Capability) -> Outcome<User, ApiError> {
    let principal = match request.guard::<Principal>().await {
        Outcome::Success(p) => p,
        _ => Principal::default(),
    };
    match authorize(&principal, needed) {
        Ok(Some(user)) => Outcome::Success(user),
        Ok(None) | Err(_) => Outcome::Error((Status::Unauthorized, ApiError::Unauthorized)),
    }
}

/// Guard: any signed-in user.
pub struct AuthenticatedUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard(request, Capability::Authenticated)
            .await
            .map(|user| AuthenticatedUser { user })
    }
}

/// Guard: role = admin.
pub struct AdminUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard(request, Capability::Admin)
            .await
            .map(|user| AdminUser { user })
    }
}

// ── Password utilities ──

pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── Session cookie ──

pub fn session_id(cookies: &CookieJar<'_>) -> Option<String> {
    cookies.get_private(SESSION_COOKIE).map(|c| c.value().to_string())
}

pub fn set_session_cookie(cookies: &CookieJar<'_>, session_id: &str) {
    let mut cookie = Cookie::new(SESSION_COOKIE, session_id.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookies.add_private(cookie);
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::from(SESSION_COOKIE));
}

/// Hash a client address so raw IPs never become map keys.
pub fn hash_ip(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}
