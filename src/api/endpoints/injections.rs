//! Patients overdue for their next allergy injection.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db;
use crate::injections::{missed_injections, MissedInjection, DEFAULT_LOOKBACK_WEEKS};

#[derive(Deserialize)]
pub struct MissedQuery {
    pub weeks: Option<String>,
}

fn lookback_weeks(raw: Option<&str>) -> Result<u32, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_LOOKBACK_WEEKS),
        Some(s) => s
            .parse::<u32>()
            .map_err(|_| ApiError::BadRequest("weeks must be a non-negative integer".into())),
    }
}

/// `GET /api/missed-injections/?weeks=`
pub async fn missed(
    State(ctx): State<ApiContext>,
    Query(query): Query<MissedQuery>,
) -> Result<Json<Vec<MissedInjection>>, ApiError> {
    let weeks = lookback_weeks(query.weeks.as_deref())?;
    let conn = ctx.core.open_db()?;
    let latest = db::fetch_last_injections(&conn)?;
    let today = Utc::now().date_naive();
    Ok(Json(missed_injections(today, weeks, &latest)))
}
