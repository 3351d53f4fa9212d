//! Patient name search.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db;
use crate::models::PatientSearchHit;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

/// `GET /api/search/?name=`: case-insensitive substring match on any name part.
pub async fn patients(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PatientSearchHit>>, ApiError> {
    let name = query.name.unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Please provide a name to search.".into()));
    }

    let conn = ctx.core.open_db()?;
    let hits = db::search_patients(&conn, name)?;
    if hits.is_empty() {
        return Err(ApiError::NotFound("No patients found.".into()));
    }
    Ok(Json(hits))
}
