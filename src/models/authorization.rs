use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Insurance pre-authorization for a drug or treatment course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationFields {
    #[serde(rename = "patient")]
    pub patient_id: i64,
    pub drug_name: String,
    pub dose: String,
    pub frequency: String,
    pub insurance: String,
    pub auth_number: String,
    pub expiration_date: NaiveDate,
    pub at_home: bool,
    pub cost_estimate: String,
    pub visit_history: String,
    pub icd10_codes: String,
    pub procedure_codes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureFields {
    pub code: String,
    pub units: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureDetail {
    pub id: i64,
    #[serde(flatten)]
    pub fields: ProcedureFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationEntry {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AuthorizationFields,
    /// Path relative to the media root, e.g. `authorization_docs/<name>.pdf`.
    pub uploaded_doc: Option<String>,
    pub procedures: Vec<ProcedureDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated entry ready to be written, with its procedure lines.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuthorization {
    pub fields: AuthorizationFields,
    pub uploaded_doc: Option<String>,
    pub procedures: Vec<ProcedureFields>,
}
