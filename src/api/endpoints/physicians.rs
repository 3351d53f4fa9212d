//! Physician profiles. Created at signup only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;

use crate::api::endpoints::{found, patched, stored, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::models::enums::Degree;
use crate::models::{Physician, PhysicianFields};
use crate::validation::Form;

fn physician_fields(form: &mut Form<'_>) -> Result<Option<PhysicianFields>, DatabaseError> {
    let name = form.required_str("name", 255);
    let degree = form.required_choice::<Degree>("degree");
    Ok(name.zip(degree).map(|(name, degree)| PhysicianFields { name, degree }))
}

/// `GET /api/physicians/`
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Physician>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_physicians(&conn)?))
}

/// `GET /api/physicians/:id/`
pub async fn detail(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<Physician>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_physician(&conn, id)?, "physician")?))
}

/// `PUT /api/physicians/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Physician>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_physician(&conn, id)?, "physician")?;
    let current = stored(&existing.fields)?;
    save(&conn, id, Form::over(&body, &current))
}

/// `PATCH /api/physicians/:id/`
pub async fn partial_update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Physician>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_physician(&conn, id)?, "physician")?;
    let merged = patched(&existing.fields, &body)?;
    save(&conn, id, Form::new(&merged))
}

fn save(conn: &Connection, id: i64, form: Form<'_>) -> Result<Json<Physician>, ApiError> {
    let fields = validate_form(form, physician_fields)?;
    db::update_physician(conn, id, &fields)?;
    Ok(Json(found(db::get_physician(conn, id)?, "physician")?))
}

/// `DELETE /api/physicians/:id/`: the login account stays; patients
/// referred by this physician keep their record with the reference cleared.
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_physician(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}
