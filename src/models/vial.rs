use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VialFields {
    #[serde(rename = "patient")]
    pub patient_id: i64,
    pub name: String,
    pub expiration_date: Option<NaiveDate>,
    pub allergens: Vec<String>,
    pub diagnosis_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vial {
    pub id: i64,
    #[serde(flatten)]
    pub fields: VialFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
