#[macro_use]
extern crate rocket;

use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use serde_json::Value;

mod analytics;
mod boot;
mod config;
mod db;
mod email;
mod error;
mod models;
mod query;
mod rate_limit;
mod routes;
mod security;
mod slugs;
mod transform;

#[cfg(test)]
mod tests;

use analytics::ViewCounter;
use config::BlogConfig;
use db::DbPool;
use error::{error_body, ApiError};
use models::user::Session;
use rate_limit::RateLimiter;

#[catch(400)]
fn bad_request() -> Json<Value> {
    Json(error_body("Bad request"))
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(error_body(&ApiError::Unauthorized.to_string()))
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Value> {
    Json(error_body(&format!("No route for {}", req.uri().path())))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(error_body("Invalid request body"))
}

#[catch(429)]
fn too_many_requests() -> Json<Value> {
    Json(error_body("Too many requests"))
}

#[catch(500)]
fn server_error() -> Json<Value> {
    Json(error_body("Internal server error"))
}

/// Assemble the server around an initialized pool. Shared by `main` and the
/// HTTP tests.
pub fn build(pool: DbPool, config: BlogConfig) -> Rocket<Build> {
    let counter = ViewCounter::new(&config.counted_paths);
    let limiter = RateLimiter::from_config(&config);

    rocket::build()
        .manage(pool)
        .manage(counter)
        .manage(limiter)
        .manage(config)
        .mount("/api", routes::public::routes())
        .mount("/api", routes::api::routes())
        .mount("/api/auth", routes::auth::routes())
        .mount("/api/admin", routes::admin::routes())
        .register(
            "/",
            catchers![bad_request, unauthorized, not_found, unprocessable, too_many_requests, server_error],
        )
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let config = BlogConfig::from_figment(&rocket::Config::figment());

    // Boot check: verify/create the database directory
    boot::run(&config);

    let pool = db::init_pool(&config).expect("Failed to initialize database pool");
    db::run_migrations(&pool).expect("Failed to run database migrations");
    db::seed_defaults(&pool).expect("Failed to seed default settings");
    db::ensure_admin(&pool, &config).expect("Failed to create bootstrap admin");

    match Session::cleanup_expired(&pool) {
        Ok(0) => {}
        Ok(n) => log::info!("Purged {} expired session(s)", n),
        Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
    }

    log::info!("Serving {} with {} counted path(s)", config.database_path, config.counted_paths.len());
    build(pool, config)
}
