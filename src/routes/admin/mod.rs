use serde_json::{json, Value};

pub mod categories;
pub mod comments;
pub mod dashboard;
pub mod posts;
pub mod settings;

/// Every admin route; all of them require the admin capability.
pub fn routes() -> Vec<rocket::Route> {
    let mut routes = Vec::new();
    routes.extend(dashboard::routes());
    routes.extend(posts::routes());
    routes.extend(categories::routes());
    routes.extend(comments::routes());
    routes.extend(settings::routes());
    routes
}

/// Body returned by mutating admin endpoints.
pub(crate) fn ok() -> Value {
    json!({ "success": true })
}

/// Like `ok`, with the affected row id.
pub(crate) fn ok_id(id: i64) -> Value {
    json!({ "success": true, "id": id })
}
