use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::enums::{Arm, InjectionReaction};

/// One administered dose from a vial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergyTemplateFields {
    #[serde(rename = "vial")]
    pub vial_id: i64,
    pub dose: String,
    pub date: NaiveDate,
    pub arm: Arm,
    pub peak_flow: String,
    pub tech_id: String,
    pub hcrm_applied: bool,
    pub reaction: InjectionReaction,
    pub notes: Option<String>,
    pub vial_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllergyTemplate {
    pub id: i64,
    pub vial_name: String,
    #[serde(flatten)]
    pub fields: AllergyTemplateFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Most recent injection date for a patient, across all of their vials.
#[derive(Debug, Clone, PartialEq)]
pub struct LastInjection {
    pub patient_id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub phone: String,
    pub last_injection: NaiveDate,
}
