use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

/// Service configuration, read from the `blog` table of Rocket's figment
/// (`Rocket.toml` or `ROCKET_BLOG=...` environment overrides).
///
/// Runtime site settings (site name, SMTP, moderation) live in the
/// `settings` table instead so the admin console can change them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    /// SQLite database file.
    pub database_path: String,
    pub pool_size: u32,
    pub session_expiry_hours: i64,

    pub list_page_size: i64,
    pub category_page_size: i64,
    pub tag_page_size: i64,
    pub search_page_size: i64,
    /// Upper bound for a client-supplied `limit`.
    pub max_page_size: i64,

    /// Static paths eligible for view counting. Single-post paths
    /// (`/blog/<slug>`) are always eligible.
    pub counted_paths: Vec<String>,

    pub login_attempts: u64,
    pub comment_attempts: u64,
    pub rate_window_minutes: u64,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`. Only
    /// enable behind a reverse proxy that overwrites those headers.
    pub trust_proxy_headers: bool,

    /// Bootstrap admin, created only when the users table is empty.
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for BlogConfig {
    fn default() -> Self {
        BlogConfig {
            database_path: "data/quillpost.db".to_string(),
            pool_size: 10,
            session_expiry_hours: 24,
            list_page_size: 10,
            category_page_size: 9,
            tag_page_size: 9,
            search_page_size: 10,
            max_page_size: 50,
            counted_paths: ["/", "/blog", "/about", "/contact", "/categories", "/tags", "/search"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            login_attempts: 10,
            comment_attempts: 5,
            rate_window_minutes: 15,
            trust_proxy_headers: false,
            admin_username: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl BlogConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        match figment.extract_inner::<BlogConfig>("blog") {
            Ok(config) => config,
            Err(e) => {
                if !e.missing() {
                    log::warn!("Invalid [blog] configuration, using defaults: {}", e);
                }
                BlogConfig::default()
            }
        }
    }

    /// Clamp a requested page size to `1..=max_page_size`, falling back to
    /// the route default when absent.
    pub fn page_size(&self, requested: Option<i64>, route_default: i64) -> i64 {
        requested
            .unwrap_or(route_default)
            .clamp(1, self.max_page_size.max(1))
    }
}
