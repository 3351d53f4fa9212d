//! Insurance authorizations: batch intake from the multipart form, plus
//! per-entry read, replace and delete.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::endpoints::{found, parse_id_param, stored, validate, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::intake::{parse_entries, FlatForm, UploadedFile};
use crate::models::{AuthorizationEntry, AuthorizationFields, NewAuthorization, ProcedureFields};
use crate::validation::{FieldErrors, Form};

const TEXT: usize = usize::MAX;

#[derive(Deserialize)]
pub struct AuthorizationQuery {
    pub patient_id: Option<String>,
}

#[derive(Serialize)]
pub struct BatchCreated {
    pub message: &'static str,
    pub data: Vec<AuthorizationEntry>,
}

fn procedure_fields(form: &mut Form<'_>) -> Option<ProcedureFields> {
    let code = form.required_str("code", 100);
    let units = form.required_u32("units");
    let start_date = form.required_date("start_date");
    let end_date = form.required_date("end_date");
    let frequency = form.required_str("frequency", 100);
    let description = form.blank_str("description", TEXT, "");

    Some(ProcedureFields {
        code: code?,
        units: units?,
        start_date: start_date?,
        end_date: end_date?,
        frequency: frequency?,
        description: description?,
    })
}

/// Entry fields plus the full procedure list. Procedure problems are
/// reported as `procedures[i].<field>`.
fn authorization_fields(
    conn: &Connection,
    form: &mut Form<'_>,
) -> Result<Option<(AuthorizationFields, Vec<ProcedureFields>)>, DatabaseError> {
    let patient = form.required_pk("patient");
    let patient = form.existing("patient", patient, |id| db::patient_exists(conn, id))?;
    let drug_name = form.required_str("drug_name", 255);
    let dose = form.required_str("dose", 100);
    let frequency = form.required_str("frequency", 100);
    let insurance = form.required_str("insurance", 255);
    let auth_number = form.required_str("auth_number", 100);
    let expiration_date = form.required_date("expiration_date");
    let at_home = form.bool_or("at_home", false);
    let cost_estimate = form.blank_str("cost_estimate", 100, "");
    let visit_history = form.blank_str("visit_history", TEXT, "");
    let icd10_codes = form.blank_str("icd10_codes", TEXT, "");
    let procedure_codes = form.blank_str("procedure_codes", TEXT, "");

    let mut procedures = Vec::new();
    for (i, item) in form.object_list("procedures").unwrap_or_default().into_iter().enumerate() {
        let mut nested = Form::new(item);
        let parsed = procedure_fields(&mut nested);
        match nested.finish() {
            Ok(()) => procedures.extend(parsed),
            Err(errors) => form.absorb(&format!("procedures[{i}]"), errors),
        }
    }
    if form.has_errors() {
        return Ok(None);
    }

    let fields = (|| {
        Some(AuthorizationFields {
            patient_id: patient?,
            drug_name: drug_name?,
            dose: dose?,
            frequency: frequency?,
            insurance: insurance?,
            auth_number: auth_number?,
            expiration_date: expiration_date?,
            at_home: at_home?,
            cost_estimate: cost_estimate?,
            visit_history: visit_history?,
            icd10_codes: icd10_codes?,
            procedure_codes: procedure_codes?,
        })
    })();
    Ok(fields.map(|fields| (fields, procedures)))
}

async fn read_multipart(mut multipart: Multipart) -> Result<FlatForm, ApiError> {
    let mut flat = FlatForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                flat.files.insert(
                    name,
                    UploadedFile {
                        file_name,
                        bytes: bytes.to_vec(),
                    },
                );
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                flat.fields.insert(name, text);
            }
        }
    }
    Ok(flat)
}

/// `POST /api/authorization/`: every entry is validated before anything is
/// written; one bad entry rejects the whole batch.
pub async fn create_batch(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BatchCreated>), ApiError> {
    let flat = read_multipart(multipart).await?;
    let Some(patient_id) = flat.field("patientId").map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(ApiError::BadRequest("Patient ID is required.".into()));
    };
    let patient_id = patient_id.to_string();
    let drafts = parse_entries(flat);

    let conn = ctx.core.open_db()?;
    let mut validated = Vec::with_capacity(drafts.len());
    let mut report: Vec<FieldErrors> = Vec::with_capacity(drafts.len());
    for draft in &drafts {
        let payload = draft.to_payload(&patient_id);
        match validate(&payload, |form| authorization_fields(&conn, form)) {
            Ok(parsed) => {
                validated.push(parsed);
                report.push(FieldErrors::new());
            }
            Err(ApiError::Validation(errors)) => report.push(errors),
            Err(other) => return Err(other),
        }
    }
    if report.iter().any(|errors| !errors.is_empty()) {
        return Err(ApiError::BatchValidation(report));
    }

    let mut saved = Vec::new();
    let mut batch = Vec::with_capacity(validated.len());
    for (draft, (fields, procedures)) in drafts.iter().zip(validated) {
        let uploaded_doc = match &draft.doc {
            Some(doc) => match ctx.core.documents.save(&doc.file_name, &doc.bytes) {
                Ok(relative) => {
                    saved.push(relative.clone());
                    Some(relative)
                }
                Err(e) => {
                    ctx.core.documents.discard(&saved);
                    return Err(e.into());
                }
            },
            None => None,
        };
        batch.push(NewAuthorization {
            fields,
            uploaded_doc,
            procedures,
        });
    }

    let ids = match db::insert_authorization_batch(&conn, &batch) {
        Ok(ids) => ids,
        Err(e) => {
            ctx.core.documents.discard(&saved);
            return Err(e.into());
        }
    };

    let mut data = Vec::with_capacity(ids.len());
    for id in ids {
        data.push(found(db::get_authorization(&conn, id)?, "authorization entry")?);
    }
    tracing::info!(patient_id = %patient_id, entries = data.len(), documents = saved.len(), "Authorizations created");

    Ok((
        StatusCode::CREATED,
        Json(BatchCreated {
            message: "Authorization entries created successfully.",
            data,
        }),
    ))
}

/// `GET /api/authorization-entries/?patient_id=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<AuthorizationQuery>,
) -> Result<Json<Vec<AuthorizationEntry>>, ApiError> {
    let Some(patient_id) = parse_id_param("patient_id", query.patient_id.as_deref())? else {
        return Err(ApiError::BadRequest("patient_id is required".into()));
    };
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_authorizations_for_patient(&conn, patient_id)?))
}

/// `GET /api/authorization-entries/:id/`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<AuthorizationEntry>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_authorization(&conn, id)?, "authorization entry")?))
}

/// `PUT /api/authorization-entries/:id/`: the submitted `procedures` list
/// replaces the stored one; the uploaded document and any optional field
/// the body leaves out are kept.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<AuthorizationEntry>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_authorization(&conn, id)?, "authorization entry")?;
    let current = stored(&existing.fields)?;
    let (fields, procedures) =
        validate_form(Form::over(&body, &current), |form| authorization_fields(&conn, form))?;
    db::replace_authorization(&conn, id, &fields, &procedures)?;
    Ok(Json(found(db::get_authorization(&conn, id)?, "authorization entry")?))
}

/// `DELETE /api/authorization-entries/:id/`: also removes the stored document.
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    if let Some(doc) = db::delete_authorization(&conn, id)? {
        ctx.core.documents.discard(&[doc]);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::endpoints::test_support::*;

    #[tokio::test]
    async fn batch_creates_entries_procedures_and_documents() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;

        let mut fields = entry_fields(0, "Xolair");
        fields.push(("entries[0].at_home".into(), "True".into()));
        fields.extend(entry_fields(1, "Dupixent"));
        fields.push(("patientId".into(), patient.to_string()));

        let (status, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[1].docs", "approval letter.pdf", b"%PDF-1.4")],
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["message"], "Authorization entries created successfully.");

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["at_home"], true);
        assert!(data[0]["uploaded_doc"].is_null());
        assert_eq!(data[0]["procedures"][0]["units"], 2);
        assert_eq!(data[1]["at_home"], false);
        assert_eq!(data[1]["icd10_codes"], "");

        let doc = data[1]["uploaded_doc"].as_str().unwrap();
        assert!(doc.starts_with("authorization_docs/"));
        assert!(doc.ends_with("_approval_letter.pdf"));
        assert!(app.core.documents.media_dir().join(doc).is_file());

        let (status, list) = app.get(&format!("/api/authorization-entries/?patient_id={patient}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_bad_entry_rejects_the_batch() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;

        let mut fields = entry_fields(0, "Xolair");
        let mut bad = entry_fields(1, "Dupixent");
        bad.retain(|(k, _)| !k.ends_with("].dose") && !k.ends_with("procedures[0].units"));
        fields.extend(bad);
        fields.push(("patientId".into(), patient.to_string()));

        let (status, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[0].docs", "card.pdf", b"x")],
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let report = body["error"]["fields"].as_array().unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0], json!({}));
        assert_eq!(report[1]["dose"][0], "This field is required.");
        assert_eq!(report[1]["procedures[0].units"][0], "This field is required.");

        let (_, list) = app.get(&format!("/api/authorization-entries/?patient_id={patient}")).await;
        assert_eq!(list, json!([]));
        let docs = app.core.documents.media_dir().join("authorization_docs");
        let stored = std::fs::read_dir(&docs).map(|d| d.count()).unwrap_or(0);
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn unknown_patient_is_reported_per_entry() {
        let app = TestApp::new().await;
        let mut fields = entry_fields(0, "Xolair");
        fields.push(("patientId".into(), "4242".into()));

        let (status, body) = app
            .send(multipart_request("/api/authorization/", &app.token, &as_refs(&fields), &[]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["fields"][0]["patient"][0],
            "Invalid pk \"4242\" - object does not exist."
        );
    }

    #[tokio::test]
    async fn missing_patient_id_and_empty_batch() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;

        let fields = entry_fields(0, "Xolair");
        let (status, body) = app
            .send(multipart_request("/api/authorization/", &app.token, &as_refs(&fields), &[]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Patient ID is required.");

        let patient_field = patient.to_string();
        let (status, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &[("patientId", patient_field.as_str())],
                &[],
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn list_requires_patient_id() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/api/authorization-entries/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_replaces_procedures_and_keeps_document() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;
        let mut fields = entry_fields(0, "Xolair");
        fields.push(("entries[0].procedures[1].code".into(), "95117".into()));
        fields.push(("entries[0].procedures[1].units".into(), "1".into()));
        fields.push(("entries[0].procedures[1].start_date".into(), "2025-01-01".into()));
        fields.push(("entries[0].procedures[1].end_date".into(), "2025-06-30".into()));
        fields.push(("entries[0].procedures[1].frequency".into(), "Weekly".into()));
        fields.push(("entries[0].at_home".into(), "True".into()));
        fields.push(("entries[0].cost_estimate".into(), "$1,200".into()));
        fields.push(("patientId".into(), patient.to_string()));
        let (_, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[0].docs", "card.pdf", b"x")],
            ))
            .await;
        let entry = &body["data"][0];
        let id = entry["id"].as_i64().unwrap();
        assert_eq!(entry["procedures"].as_array().unwrap().len(), 2);
        let doc = entry["uploaded_doc"].as_str().unwrap().to_string();

        let (status, body) = app
            .put(
                &format!("/api/authorization-entries/{id}/"),
                json!({
                    "patient": patient,
                    "drug_name": "Xolair",
                    "dose": "300mg",
                    "frequency": "Every 2 weeks",
                    "insurance": "Acme Health",
                    "auth_number": "AUTH-0",
                    "expiration_date": "2026-06-30",
                    "procedures": [{
                        "code": "J2357",
                        "units": 3,
                        "start_date": "2025-02-01",
                        "end_date": "2026-01-31",
                        "frequency": "Biweekly",
                        "description": "Omalizumab",
                    }],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["dose"], "300mg");
        assert_eq!(body["uploaded_doc"], doc.as_str());
        assert_eq!(body["at_home"], true);
        assert_eq!(body["cost_estimate"], "$1,200");
        let procedures = body["procedures"].as_array().unwrap();
        assert_eq!(procedures.len(), 1);
        assert_eq!(procedures[0]["code"], "J2357");

        let (status, body) = app
            .put(
                &format!("/api/authorization-entries/{id}/"),
                json!({"patient": patient, "procedures": [{"code": "X", "units": -1}]}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["fields"]["procedures[0].units"][0],
            "Ensure this value is greater than or equal to 0."
        );
    }

    #[tokio::test]
    async fn delete_removes_entry_and_document() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;
        let mut fields = entry_fields(0, "Xolair");
        fields.push(("patientId".into(), patient.to_string()));
        let (_, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[0].docs", "card.pdf", b"x")],
            ))
            .await;
        let id = body["data"][0]["id"].as_i64().unwrap();
        let doc = app
            .core
            .documents
            .media_dir()
            .join(body["data"][0]["uploaded_doc"].as_str().unwrap());
        assert!(doc.is_file());

        let (status, _) = app.delete(&format!("/api/authorization-entries/{id}/")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!doc.exists());
        let (status, _) = app.get(&format!("/api/authorization-entries/{id}/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_document_is_served_from_media() {
        let app = TestApp::new().await;
        let patient = app.add_patient("Ann", "Smith", "1001").await;
        let mut fields = entry_fields(0, "Xolair");
        fields.push(("patientId".into(), patient.to_string()));
        let (_, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[0].docs", "card.pdf", b"%PDF-1.4")],
            ))
            .await;
        let doc = body["data"][0]["uploaded_doc"].as_str().unwrap();

        let (status, served) = app.send(empty_request("GET", &format!("/media/{doc}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(served, "%PDF-1.4");
    }
}
