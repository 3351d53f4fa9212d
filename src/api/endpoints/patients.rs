//! Patient demographics and insurance records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use serde::Serialize;

use crate::api::endpoints::{found, patched, stored, validate, validate_form};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, JsonObject};
use crate::db::{self, DatabaseError};
use crate::models::enums::*;
use crate::models::{Patient, PatientFields, PatientSummary};
use crate::validation::Form;

const NAME_MAX: usize = 100;
const PHONE_MAX: usize = 20;
const TEXT: usize = usize::MAX;

#[derive(Serialize)]
pub struct PatientCreated {
    pub message: &'static str,
    pub patient: Patient,
}

fn patient_fields(conn: &Connection, form: &mut Form<'_>) -> Result<Option<PatientFields>, DatabaseError> {
    let first_name = form.required_str("first_name", NAME_MAX);
    let middle_name = form.optional_str("middle_name", NAME_MAX);
    let last_name = form.required_str("last_name", NAME_MAX);
    let birth_date = form.required_date("birth_date");
    let gender = form.required_choice::<Gender>("gender");
    let email = form.optional_email("email", 254);
    let marital_status = form.required_choice::<MaritalStatus>("marital_status");
    let ssn = form.required_str("ssn", 11);
    let address = form.required_str("address", TEXT);
    let address_2 = form.optional_str("address_2", TEXT);
    let city = form.required_str("city", NAME_MAX);
    let state = form.required_choice::<UsState>("state");
    let zip_code = form.required_str("zip_code", 10);
    let county = form.optional_str("county", NAME_MAX);
    let phone = form.required_str("phone", PHONE_MAX);
    let pcp = form.optional_str("pcp", 255);
    let ref_physician = form.optional_pk("ref_physician");
    let ref_physician = form.existing("ref_physician", ref_physician, |id| db::physician_exists(conn, id))?;
    let language = form.required_choice::<Language>("language");
    let ethnicity = form.required_choice::<Ethnicity>("ethnicity");
    let patient_consent = form.bool_or("patient_consent", true);
    let insurance_type = form.required_choice::<InsuranceType>("insurance_type");
    let insurance_id = form.required_str("insurance_id", 100);
    let group_number = form.required_str("group_number", 100);
    let service_type = form.optional_pk("service_type");
    let service_type = form.existing("service_type", service_type, |id| db::service_type_exists(conn, id))?;
    let date_of_service = form.required_date("date_of_service");
    let plan_number = form.required_str("plan_number", 255);
    let co_pay = form.optional_decimal("co_pay", 10, 2);
    let eligibility_date = form.optional_date("eligibility_date");
    let termination_date = form.optional_date("termination_date");
    let payer_phone = form.required_str("payer_phone", PHONE_MAX);
    let payer_fax = form.required_str("payer_fax", PHONE_MAX);
    let relationship = form.required_choice::<Relationship>("relationship");
    let referral = form.bool_or("referral", false);
    let comments = form.optional_str("comments", TEXT);

    Ok((|| {
        Some(PatientFields {
            first_name: first_name?,
            middle_name,
            last_name: last_name?,
            birth_date: birth_date?,
            gender: gender?,
            email,
            marital_status: marital_status?,
            ssn: ssn?,
            address: address?,
            address_2,
            city: city?,
            state: state?,
            zip_code: zip_code?,
            county,
            phone: phone?,
            pcp,
            ref_physician_id: ref_physician,
            language: language?,
            ethnicity: ethnicity?,
            patient_consent: patient_consent?,
            insurance_type: insurance_type?,
            insurance_id: insurance_id?,
            group_number: group_number?,
            service_type_id: service_type,
            date_of_service: date_of_service?,
            plan_number: plan_number?,
            co_pay,
            eligibility_date,
            termination_date,
            payer_phone: payer_phone?,
            payer_fax: payer_fax?,
            relationship: relationship?,
            referral: referral?,
            comments,
        })
    })())
}

/// `POST /api/patients/add/`
pub async fn add(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<PatientCreated>), ApiError> {
    let conn = ctx.core.open_db()?;
    let fields = validate(&body, |form| patient_fields(&conn, form))?;
    let id = db::insert_patient(&conn, &fields)?;
    let patient = found(db::get_patient(&conn, id)?, "patient")?;
    tracing::info!(patient_id = id, "Patient added");

    Ok((
        StatusCode::CREATED,
        Json(PatientCreated {
            message: "Patient added successfully",
            patient,
        }),
    ))
}

/// `GET /api/patients/`: summary rows for the front desk.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<PatientSummary>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_patient_summaries(&conn)?))
}

/// `GET /api/patients/:id/`
pub async fn detail(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(found(db::get_patient(&conn, id)?, "patient")?))
}

/// `PUT /api/patients/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_patient(&conn, id)?, "patient")?;
    let current = stored(&existing.fields)?;
    save(&conn, id, Form::over(&body, &current))
}

/// `PATCH /api/patients/:id/`
pub async fn partial_update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    let existing = found(db::get_patient(&conn, id)?, "patient")?;
    let merged = patched(&existing.fields, &body)?;
    save(&conn, id, Form::new(&merged))
}

fn save(conn: &Connection, id: i64, form: Form<'_>) -> Result<Json<Patient>, ApiError> {
    let fields = validate_form(form, |form| patient_fields(conn, form))?;
    db::update_patient(conn, id, &fields)?;
    Ok(Json(found(db::get_patient(conn, id)?, "patient")?))
}

/// `DELETE /api/patients/:id/`: removes every record hanging off the
/// patient. Stored authorization documents are removed after the rows.
pub async fn destroy(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    let docs: Vec<String> = db::list_authorizations_for_patient(&conn, id)?
        .into_iter()
        .filter_map(|entry| entry.uploaded_doc)
        .collect();
    db::delete_patient(&conn, id)?;
    ctx.core.documents.discard(&docs);
    tracing::info!(patient_id = id, "Patient deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::endpoints::test_support::*;

    #[tokio::test]
    async fn add_returns_message_and_full_record() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/api/patients/add/", patient_json("Ann", "Smith", "1001")).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["message"], "Patient added successfully");
        let patient = &body["patient"];
        assert_eq!(patient["first_name"], "Ann");
        assert_eq!(patient["patient_consent"], true);
        assert_eq!(patient["referral"], false);
        assert_eq!(patient["co_pay"], "25.00");
        assert!(patient["ref_physician"].is_null());
    }

    #[tokio::test]
    async fn unique_columns_and_missing_fields_are_field_errors() {
        let app = TestApp::new().await;
        app.add_patient("Ann", "Smith", "1001").await;

        let (status, body) = app.post("/api/patients/add/", patient_json("Ann", "Twin", "1001")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields = body["error"]["fields"].as_object().unwrap();
        assert_eq!(fields.len(), 1);
        let (column, messages) = fields.iter().next().unwrap();
        assert_eq!(messages[0], format!("A record with this {column} already exists."));

        let (status, body) = app
            .post("/api/patients/add/", json!({"first_name": "Ann", "state": "ZZ"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields = &body["error"]["fields"];
        assert_eq!(fields["last_name"][0], "This field is required.");
        assert_eq!(fields["state"][0], "\"ZZ\" is not a valid choice.");
        assert!(fields.get("first_name").is_none());
    }

    #[tokio::test]
    async fn references_are_checked() {
        let app = TestApp::new().await;
        let mut payload = patient_json("Ann", "Smith", "1001");
        payload["ref_physician"] = json!(77);
        payload["service_type"] = json!(88);
        let (status, body) = app.post("/api/patients/add/", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["fields"]["ref_physician"][0], "Invalid pk \"77\" - object does not exist.");
        assert_eq!(body["error"]["fields"]["service_type"][0], "Invalid pk \"88\" - object does not exist.");

        let (_, physicians) = app.get("/api/physicians/").await;
        let mut payload = patient_json("Ann", "Smith", "1001");
        payload["ref_physician"] = physicians[0]["id"].clone();
        let (status, body) = app.post("/api/patients/add/", payload).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["patient"]["ref_physician"], physicians[0]["id"]);
    }

    #[tokio::test]
    async fn list_returns_summary_rows() {
        let app = TestApp::new().await;
        let id = app.add_patient("Ann", "Smith", "1001").await;
        let (status, body) = app.get("/api/patients/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "id": id,
                "first_name": "Ann",
                "middle_name": null,
                "last_name": "Smith",
                "birth_date": "1980-05-17",
                "insurance_type": "Primary",
                "referral": "No",
                "visits_exp": "NA",
                "last_test_date": "NA",
                "billout_date": "NA",
            }])
        );
    }

    #[tokio::test]
    async fn patch_keeps_other_fields() {
        let app = TestApp::new().await;
        let id = app.add_patient("Ann", "Smith", "1001").await;
        let (status, body) = app
            .patch(&format!("/api/patients/{id}/"), json!({"city": "Peoria", "referral": true}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["city"], "Peoria");
        assert_eq!(body["referral"], true);
        assert_eq!(body["ssn"], "000-00-1001");

        let (status, _) = app
            .put(&format!("/api/patients/{id}/"), json!({"city": "Peoria"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_keeps_omitted_optional_fields() {
        let app = TestApp::new().await;
        let id = app.add_patient("Ann", "Smith", "1001").await;
        let (status, _) = app
            .patch(
                &format!("/api/patients/{id}/"),
                json!({"middle_name": "Marie", "patient_consent": false, "referral": true,
                       "comments": "Prefers mornings", "eligibility_date": "2024-02-01"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let mut replacement = patient_json("Ann", "Smith", "1001");
        replacement["city"] = json!("Peoria");
        let (status, body) = app.put(&format!("/api/patients/{id}/"), replacement.clone()).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["city"], "Peoria");
        assert_eq!(body["middle_name"], "Marie");
        assert_eq!(body["patient_consent"], false);
        assert_eq!(body["referral"], true);
        assert_eq!(body["comments"], "Prefers mornings");
        assert_eq!(body["eligibility_date"], "2024-02-01");
        assert_eq!(body["co_pay"], "25.00");

        replacement["comments"] = json!(null);
        let (_, body) = app.put(&format!("/api/patients/{id}/"), replacement).await;
        assert!(body["comments"].is_null());
        assert_eq!(body["middle_name"], "Marie");
    }

    #[tokio::test]
    async fn delete_removes_authorization_documents() {
        let app = TestApp::new().await;
        let id = app.add_patient("Ann", "Smith", "1001").await;
        let mut fields = entry_fields(0, "Xolair");
        fields.push(("patientId".into(), id.to_string()));
        let (status, body) = app
            .send(multipart_request(
                "/api/authorization/",
                &app.token,
                &as_refs(&fields),
                &[("entries[0].docs", "card.pdf", b"%PDF-1.4")],
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let doc = app
            .core
            .documents
            .media_dir()
            .join(body["data"][0]["uploaded_doc"].as_str().unwrap());
        assert!(doc.is_file());

        let (status, _) = app.delete(&format!("/api/patients/{id}/")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!doc.exists());
        let (_, entries) = app.get(&format!("/api/authorization-entries/?patient_id={id}")).await;
        assert_eq!(entries, json!([]));
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let app = TestApp::new().await;
        let id = app.add_patient("Ann", "Smith", "1001").await;
        let vial = app.add_vial(id, "Trees").await;
        app.post(
            "/api/allergen-tests/",
            json!({"patient": id, "allergen_name": "Cat", "category": "environmental"}),
        )
        .await;

        let (status, _) = app.delete(&format!("/api/patients/{id}/")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get(&format!("/api/vials/{vial}/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, tests) = app.get(&format!("/api/allergen-tests/?patientId={id}")).await;
        assert_eq!(tests, json!([]));
        let (status, _) = app.get(&format!("/api/patients/{id}/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
