//! Injection records (allergy templates), one per dose given from a vial.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::endpoints::{found, parse_id_param, patched, stored, validate, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::models::enums::{Arm, InjectionReaction};
use crate::models::{AllergyTemplate, AllergyTemplateFields, AllergyTemplateFilter};
use crate::validation::Form;

#[derive(Deserialize)]
pub struct TemplateQuery {
    pub patient: Option<String>,
}

fn template_fields(conn: &Connection, form: &mut Form<'_>) -> Result<Option<AllergyTemplateFields>, DatabaseError> {
    let vial = form.required_pk("vial");
    let vial = form.existing("vial", vial, |id| db::vial_exists(conn, id))?;
    let dose = form.required_str("dose", 50);
    let date = form.required_date("date");
    let arm = form.required_choice::<Arm>("arm");
    let peak_flow = form.required_str("peak_flow", 50);
    let tech_id = form.required_str("tech_id", 50);
    let hcrm_applied = form.bool_or("hcrm_applied", false);
    let reaction = form.required_choice::<InjectionReaction>("reaction");
    let notes = form.optional_str("notes", usize::MAX);
    let vial_color = form.optional_str("vial_color", 50);

    let (
        Some(vial_id),
        Some(dose),
        Some(date),
        Some(arm),
        Some(peak_flow),
        Some(tech_id),
        Some(hcrm_applied),
        Some(reaction),
    ) = (vial, dose, date, arm, peak_flow, tech_id, hcrm_applied, reaction)
    else {
        return Ok(None);
    };
    Ok(Some(AllergyTemplateFields {
        vial_id,
        dose,
        date,
        arm,
        peak_flow,
        tech_id,
        hcrm_applied,
        reaction,
        notes,
        vial_color,
    }))
}

/// `GET /api/allergy-templates/?patient=`: the patient filter goes through
/// the owning vial.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<AllergyTemplate>>, ApiError> {
    let filter = AllergyTemplateFilter {
        patient_id: parse_id_param("patient", query.patient.as_deref())?,
    };
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_allergy_templates(&conn, &filter)?))
}

/// `POST /api/allergy-templates/`
pub async fn create(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<AllergyTemplate>), ApiError> {
    let conn = ctx.core.open_db()?;
    let fields = validate(&body, |form| template_fields(&conn, form))?;
    let id = db::insert_allergy_template(&conn, &fields)?;
    let template = found(db::get_allergy_template(&conn, id)?, "allergy template")?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// `GET /api/allergy-templates/:id/`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<AllergyTemplate>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_allergy_template(&conn, id)?, "allergy template")?))
}

/// `PUT /api/allergy-templates/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<AllergyTemplate>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_allergy_template(&conn, id)?, "allergy template")?;
    let current = stored(&existing.fields)?;
    save(&conn, id, Form::over(&body, &current))
}

/// `PATCH /api/allergy-templates/:id/`
pub async fn partial_update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<AllergyTemplate>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_allergy_template(&conn, id)?, "allergy template")?;
    let merged = patched(&existing.fields, &body)?;
    save(&conn, id, Form::new(&merged))
}

fn save(conn: &Connection, id: i64, form: Form<'_>) -> Result<Json<AllergyTemplate>, ApiError> {
    let fields = validate_form(form, |form| template_fields(conn, form))?;
    db::update_allergy_template(conn, id, &fields)?;
    Ok(Json(found(db::get_allergy_template(conn, id)?, "allergy template")?))
}

/// `DELETE /api/allergy-templates/:id/`
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    db::delete_allergy_template(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}
