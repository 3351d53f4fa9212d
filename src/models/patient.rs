use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::enums::*;

/// Every writable patient attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientFields {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub email: Option<String>,
    pub marital_status: MaritalStatus,
    pub ssn: String,
    pub address: String,
    pub address_2: Option<String>,
    pub city: String,
    pub state: UsState,
    pub zip_code: String,
    pub county: Option<String>,
    pub phone: String,
    pub pcp: Option<String>,
    #[serde(rename = "ref_physician")]
    pub ref_physician_id: Option<i64>,
    pub language: Language,
    pub ethnicity: Ethnicity,
    pub patient_consent: bool,
    pub insurance_type: InsuranceType,
    pub insurance_id: String,
    pub group_number: String,
    #[serde(rename = "service_type")]
    pub service_type_id: Option<i64>,
    pub date_of_service: NaiveDate,
    pub plan_number: String,
    /// Decimal string with at most two fractional digits.
    pub co_pay: Option<String>,
    pub eligibility_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub payer_phone: String,
    pub payer_fax: String,
    pub relationship: Relationship,
    pub referral: bool,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: i64,
    #[serde(flatten)]
    pub fields: PatientFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Curated list row for the front desk.
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub insurance_type: InsuranceType,
    pub referral: &'static str,
    pub visits_exp: &'static str,
    pub last_test_date: String,
    pub billout_date: &'static str,
}

/// Row returned by the name search.
#[derive(Debug, Clone, Serialize)]
pub struct PatientSearchHit {
    #[serde(rename = "Patient Id")]
    pub patient_id: i64,
    #[serde(rename = "Patient Name")]
    pub patient_name: String,
    #[serde(rename = "Date of birth")]
    pub birth_date: NaiveDate,
    #[serde(rename = "Last Test Date")]
    pub last_test_date: String,
    #[serde(rename = "Insurance")]
    pub insurance: InsuranceType,
    #[serde(rename = "Referral")]
    pub referral: &'static str,
    #[serde(rename = "Visits/Exp")]
    pub visits_exp: &'static str,
    #[serde(rename = "Billout Date")]
    pub billout_date: &'static str,
}

/// Placeholder for report columns the office does not track yet.
pub const NOT_AVAILABLE: &str = "NA";

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Name parts joined by single spaces, skipping an absent or blank middle name.
pub fn full_name(first: &str, middle: Option<&str>, last: &str) -> String {
    [Some(first), middle, Some(last)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
