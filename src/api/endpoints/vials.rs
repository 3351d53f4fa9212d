//! Allergen vials mixed for a patient.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::endpoints::{found, parse_id_param, patched, stored, validate, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::models::{Vial, VialFields, VialFilter};
use crate::validation::Form;

#[derive(Deserialize)]
pub struct VialQuery {
    pub patient: Option<String>,
}

fn vial_fields(conn: &Connection, form: &mut Form<'_>) -> Result<Option<VialFields>, DatabaseError> {
    let patient = form.required_pk("patient");
    let patient = form.existing("patient", patient, |id| db::patient_exists(conn, id))?;
    let name = form.required_str("name", 100);
    let expiration_date = form.optional_date("expiration_date");
    let allergens = form.string_list("allergens");
    let diagnosis_codes = form.string_list("diagnosis_codes");

    let (Some(patient_id), Some(name), Some(allergens), Some(diagnosis_codes)) =
        (patient, name, allergens, diagnosis_codes)
    else {
        return Ok(None);
    };
    Ok(Some(VialFields {
        patient_id,
        name,
        expiration_date,
        allergens,
        diagnosis_codes,
    }))
}

/// `GET /api/vials/?patient=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<VialQuery>,
) -> Result<Json<Vec<Vial>>, ApiError> {
    let filter = VialFilter {
        patient_id: parse_id_param("patient", query.patient.as_deref())?,
    };
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_vials(&conn, &filter)?))
}

/// `POST /api/vials/`
pub async fn create(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<Vial>), ApiError> {
    let conn = ctx.core.open_db()?;
    let fields = validate(&body, |form| vial_fields(&conn, form))?;
    let id = db::insert_vial(&conn, &fields)?;
    let vial = found(db::get_vial(&conn, id)?, "vial")?;
    Ok((StatusCode::CREATED, Json(vial)))
}

/// `GET /api/vials/:id/`
pub async fn detail(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<Vial>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_vial(&conn, id)?, "vial")?))
}

/// `PUT /api/vials/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Vial>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_vial(&conn, id)?, "vial")?;
    let current = stored(&existing.fields)?;
    save(&conn, id, Form::over(&body, &current))
}

/// `PATCH /api/vials/:id/`
pub async fn partial_update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Vial>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_vial(&conn, id)?, "vial")?;
    let merged = patched(&existing.fields, &body)?;
    save(&conn, id, Form::new(&merged))
}

fn save(conn: &Connection, id: i64, form: Form<'_>) -> Result<Json<Vial>, ApiError> {
    let fields = validate_form(form, |form| vial_fields(conn, form))?;
    db::update_vial(conn, id, &fields)?;
    Ok(Json(found(db::get_vial(conn, id)?, "vial")?))
}

/// `DELETE /api/vials/:id/`: templates recorded from the vial go with it.
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_vial(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}
