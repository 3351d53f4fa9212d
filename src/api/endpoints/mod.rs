//! API endpoint handlers, one module per resource.
//!
//! Handlers open a connection per request, validate with
//! [`crate::validation::Form`] and let `?` turn repository errors into
//! HTTP responses.

pub mod accounts;
pub mod allergy_templates;
pub mod authorizations;
pub mod health;
pub mod injections;
pub mod patients;
pub mod physicians;
pub mod search;
pub mod service_types;
pub mod vials;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::error::ApiError;
use crate::db::DatabaseError;
use crate::validation::{merge_patch, Form};

/// Run `build` over `data` and return the record only if no field failed.
pub(crate) fn validate<T, F>(data: &Map<String, Value>, build: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Form<'_>) -> Result<Option<T>, DatabaseError>,
{
    validate_form(Form::new(data), build)
}

pub(crate) fn validate_form<T, F>(mut form: Form<'_>, build: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Form<'_>) -> Result<Option<T>, DatabaseError>,
{
    let built = build(&mut form)?;
    form.finish().map_err(ApiError::Validation)?;
    built.ok_or_else(|| ApiError::Internal("validated record is incomplete".into()))
}

/// A stored record as the JSON object its serializer produces.
pub(crate) fn stored<T: Serialize>(existing: &T) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(existing) {
        Ok(Value::Object(base)) => Ok(base),
        Ok(_) => Err(ApiError::Internal("record did not serialize to an object".into())),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// The payload a PATCH validates: the stored record with the request's
/// members laid over it.
pub(crate) fn patched<T: Serialize>(existing: &T, patch: &Map<String, Value>) -> Result<Map<String, Value>, ApiError> {
    Ok(merge_patch(stored(existing)?, patch))
}

pub(crate) fn found<T>(record: Option<T>, entity: &str) -> Result<T, ApiError> {
    record.ok_or_else(|| ApiError::NotFound(format!("No {entity} matches the given query.")))
}

/// Query-string id that must be an integer when present.
pub(crate) fn parse_id_param(name: &str, raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{name} must be an integer"))),
    }
}
