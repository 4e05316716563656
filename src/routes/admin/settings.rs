use std::collections::HashMap;

use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::ok;
use crate::db::DbPool;
use crate::error::{ApiError, Result};
use crate::models::settings::Setting;
use crate::security::auth::AdminUser;

/// Never echoed back; an empty value on save keeps the stored secret.
const SECRET_KEYS: [&str; 1] = ["smtp_password"];

const MODERATION_MODES: [&str; 2] = ["manual", "auto"];

#[get("/settings")]
pub fn settings_get(_admin: AdminUser, pool: &State<DbPool>) -> Result<Json<Value>> {
    let mut settings = Setting::all(pool)?;
    for key in SECRET_KEYS {
        if let Some(value) = settings.get_mut(key) {
            if !value.is_empty() {
                *value = "********".to_string();
            }
        }
    }
    Ok(Json(json!({ "settings": settings })))
}

#[put("/settings", format = "json", data = "<form>")]
pub fn settings_save(
    admin: AdminUser,
    pool: &State<DbPool>,
    form: Json<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let mut data = form.into_inner();
    data.retain(|key, value| !(SECRET_KEYS.contains(&key.as_str()) && (value.is_empty() || value.as_str() == "********")));

    if let Some(mode) = data.get("comments_moderation") {
        if !MODERATION_MODES.contains(&mode.as_str()) {
            return Err(ApiError::BadRequest(format!("Unknown moderation mode: {}", mode)));
        }
    }
    if let Some(port) = data.get("smtp_port") {
        if port.parse::<u16>().is_err() {
            return Err(ApiError::BadRequest("SMTP port must be a number".to_string()));
        }
    }

    Setting::set_many(pool, &data)?;
    log::info!("{} updated {} setting(s)", admin.user.username, data.len());
    Ok(Json(ok()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![settings_get, settings_save]
}
