//! Billing service types referenced by patients.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;

use crate::api::endpoints::{found, patched, stored, validate, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::models::{ServiceType, ServiceTypeFields};
use crate::validation::Form;

fn service_type_fields(form: &mut Form<'_>) -> Result<Option<ServiceTypeFields>, DatabaseError> {
    let code = form.required_str("code", 10);
    let description = form.required_str("description", 255);
    Ok(code
        .zip(description)
        .map(|(code, description)| ServiceTypeFields { code, description }))
}

/// `GET /api/service-types/`: ordered by code.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<ServiceType>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_service_types(&conn)?))
}

/// `POST /api/service-types/`
pub async fn create(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<ServiceType>), ApiError> {
    let fields = validate(&body, service_type_fields)?;
    let conn = ctx.core.open_db()?;
    let id = db::insert_service_type(&conn, &fields)?;
    Ok((StatusCode::CREATED, Json(found(db::get_service_type(&conn, id)?, "service type")?)))
}

/// `GET /api/service-types/:id/`
pub async fn detail(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<ServiceType>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_service_type(&conn, id)?, "service type")?))
}

/// `PUT /api/service-types/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<ServiceType>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_service_type(&conn, id)?, "service type")?;
    let current = stored(&existing.fields)?;
    save(&conn, id, Form::over(&body, &current))
}

/// `PATCH /api/service-types/:id/`
pub async fn partial_update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<ServiceType>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_service_type(&conn, id)?, "service type")?;
    let merged = patched(&existing.fields, &body)?;
    save(&conn, id, Form::new(&merged))
}

fn save(conn: &Connection, id: i64, form: Form<'_>) -> Result<Json<ServiceType>, ApiError> {
    let fields = validate_form(form, service_type_fields)?;
    db::update_service_type(conn, id, &fields)?;
    Ok(Json(found(db::get_service_type(conn, id)?, "service type")?))
}

/// `DELETE /api/service-types/:id/`: patients keep their record with the
/// reference cleared.
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_service_type(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}
