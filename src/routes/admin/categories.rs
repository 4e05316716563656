use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::{ok, ok_id};
use crate::db::DbPool;
use crate::error::Result;
use crate::models::category::{Category, CategoryForm};
use crate::models::tag::{Tag, TagForm};
use crate::security::auth::AdminUser;

// ── Categories ─────────────────────────────────────────

#[get("/categories")]
pub fn categories_list(_admin: AdminUser, pool: &State<DbPool>) -> Result<Json<Value>> {
    Ok(Json(json!({ "categories": Category::list(pool)? })))
}

#[post("/categories", format = "json", data = "<form>")]
pub fn category_create(_admin: AdminUser, pool: &State<DbPool>, form: Json<CategoryForm>) -> Result<Json<Value>> {
    Ok(Json(ok_id(Category::create(pool, &form)?)))
}

#[put("/categories/<id>", format = "json", data = "<form>")]
pub fn category_update(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
    form: Json<CategoryForm>,
) -> Result<Json<Value>> {
    Category::update(pool, id, &form)?;
    Ok(Json(ok_id(id)))
}

#[delete("/categories/<id>")]
pub fn category_delete(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Category::delete(pool, id)?;
    Ok(Json(ok()))
}

// ── Tags ───────────────────────────────────────────────

#[get("/tags")]
pub fn tags_list(_admin: AdminUser, pool: &State<DbPool>) -> Result<Json<Value>> {
    Ok(Json(json!({ "tags": Tag::list(pool)? })))
}

#[post("/tags", format = "json", data = "<form>")]
pub fn tag_create(_admin: AdminUser, pool: &State<DbPool>, form: Json<TagForm>) -> Result<Json<Value>> {
    Ok(Json(ok_id(Tag::create(pool, &form)?)))
}

#[put("/tags/<id>", format = "json", data = "<form>")]
pub fn tag_update(_admin: AdminUser, pool: &State<DbPool>, id: i64, form: Json<TagForm>) -> Result<Json<Value>> {
    Tag::update(pool, id, &form)?;
    Ok(Json(ok_id(id)))
}

#[delete("/tags/<id>")]
pub fn tag_delete(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Json<Value>> {
    Tag::delete(pool, id)?;
    Ok(Json(ok()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        categories_list,
        category_create,
        category_update,
        category_delete,
        tags_list,
        tag_create,
        tag_update,
        tag_delete,
    ]
}
