use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, please wait before trying again")]
    TooManyRequests,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized => Status::Unauthorized,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::TooManyRequests => Status::TooManyRequests,
            ApiError::Database(_) | ApiError::Pool(_) | ApiError::Hash(_) | ApiError::Internal(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Map a UNIQUE constraint violation to a 409 with the given message;
    /// anything else stays a storage failure.
    pub fn unique_violation(err: rusqlite::Error, message: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ApiError::Conflict(message.to_string())
            }
            other => ApiError::Database(other),
        }
    }
}

/// Error body shared by handlers and catchers.
pub fn error_body(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let message = if status == Status::InternalServerError {
            log::error!("{} {}: {}", req.method(), req.uri(), self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(error_body(&message))).respond_to(req)
    }
}
