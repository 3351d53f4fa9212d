//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table family. All public functions are re-exported here.

mod allergy_template;
mod authorization;
mod patient;
mod physician;
mod service_type;
mod user;
mod vial;

use chrono::{DateTime, NaiveDate, Utc};

use super::DatabaseError;

pub use allergen_test::*;
pub use allergy_template::*;
pub use authorization::*;
pub use patient::*;
pub use physician::*;
pub use service_type::*;
pub use user::*;
pub use vial::*;

/// Fixed-width UTC timestamp: lexical order matches chronological order and
/// equal instants always produce equal strings.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {s}: {e}")))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date {s}: {e}")))
}

pub(crate) fn parse_opt_date(s: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    s.as_deref().map(parse_date).transpose()
}

/// Turn a zero-row UPDATE/DELETE into `NotFound`.
pub(crate) fn expect_row(changed: usize, entity_type: &str, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        Err(DatabaseError::not_found(entity_type, id))
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared builders for repository and endpoint tests.

    use chrono::NaiveDate;
    use rusqlite::Connection;

    use super::*;
    use crate::models::enums::*;
    use crate::models::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Patient with unique identity fields derived from `tag`.
    pub fn patient_fields(first: &str, last: &str, tag: &str) -> PatientFields {
        PatientFields {
            first_name: first.into(),
            middle_name: None,
            last_name: last.into(),
            birth_date: date(1980, 5, 17),
            gender: Gender::Female,
            email: Some(format!("{tag}@example.com")),
            marital_status: MaritalStatus::Single,
            ssn: format!("000-00-{tag}"),
            address: "12 Elm St".into(),
            address_2: None,
            city: "Springfield".into(),
            state: UsState::Il,
            zip_code: "62701".into(),
            county: None,
            phone: "555-0100".into(),
            pcp: None,
            ref_physician_id: None,
            language: Language::UnitedStatesEnglish,
            ethnicity: Ethnicity::NotHispanicLatino,
            patient_consent: true,
            insurance_type: InsuranceType::Primary,
            insurance_id: format!("INS-{tag}"),
            group_number: "GRP-1".into(),
            service_type_id: None,
            date_of_service: date(2024, 1, 2),
            plan_number: format!("PLAN-{tag}"),
            co_pay: Some("25.00".into()),
            eligibility_date: None,
            termination_date: None,
            payer_phone: "555-0200".into(),
            payer_fax: "555-0201".into(),
            relationship: Relationship::SelfInsured,
            referral: false,
            comments: None,
        }
    }

    pub fn make_patient(conn: &Connection, first: &str, last: &str, tag: &str) -> i64 {
        insert_patient(conn, &patient_fields(first, last, tag)).unwrap()
    }

    pub fn make_vial(conn: &Connection, patient_id: i64, name: &str) -> i64 {
        insert_vial(
            conn,
            &VialFields {
                patient_id,
                name: name.into(),
                expiration_date: Some(date(2025, 6, 30)),
                allergens: vec!["Dust mite".into(), "Cat".into()],
                diagnosis_codes: vec!["J30.1".into()],
            },
        )
        .unwrap()
    }

    pub fn template_fields(vial_id: i64, on: NaiveDate) -> AllergyTemplateFields {
        AllergyTemplateFields {
            vial_id,
            dose: "0.05ml".into(),
            date: on,
            arm: Arm::Left,
            peak_flow: "450".into(),
            tech_id: "T-7".into(),
            hcrm_applied: false,
            reaction: InjectionReaction::Nr,
            notes: None,
            vial_color: Some("blue".into()),
        }
    }

    pub fn make_template(conn: &Connection, vial_id: i64, on: NaiveDate) -> i64 {
        insert_allergy_template(conn, &template_fields(vial_id, on)).unwrap()
    }

    pub fn procedure(code: &str, units: u32) -> ProcedureFields {
        ProcedureFields {
            code: code.into(),
            units,
            start_date: date(2024, 2, 1),
            end_date: date(2024, 8, 1),
            frequency: "weekly".into(),
            description: String::new(),
        }
    }

    pub fn authorization(patient_id: i64, drug: &str, procedures: Vec<ProcedureFields>) -> NewAuthorization {
        NewAuthorization {
            fields: AuthorizationFields {
                patient_id,
                drug_name: drug.into(),
                dose: "0.5ml".into(),
                frequency: "weekly".into(),
                insurance: "Acme Health".into(),
                auth_number: format!("AUTH-{drug}"),
                expiration_date: date(2024, 12, 31),
                at_home: false,
                cost_estimate: String::new(),
                visit_history: String::new(),
                icd10_codes: String::new(),
                procedure_codes: String::new(),
            },
            uploaded_doc: None,
            procedures,
        }
    }
}
