use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_date, parse_opt_date, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, first_name, middle_name, last_name, birth_date, gender, email,
    marital_status, ssn, address, address_2, city, state, zip_code, county, phone, pcp,
    ref_physician_id, language, ethnicity, patient_consent, insurance_type, insurance_id,
    group_number, service_type_id, date_of_service, plan_number, co_pay, eligibility_date,
    termination_date, payer_phone, payer_fax, relationship, referral, comments,
    created_at, updated_at";

/// Latest allergen test per patient, as a correlated sub-select on `p`.
const LAST_TEST_SQL: &str =
    "(SELECT MAX(t.test_date) FROM allergen_tests t WHERE t.patient_id = p.id)";

pub fn insert_patient(conn: &Connection, p: &PatientFields) -> Result<i64, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO patients (first_name, middle_name, last_name, birth_date, gender, email,
         marital_status, ssn, address, address_2, city, state, zip_code, county, phone, pcp,
         ref_physician_id, language, ethnicity, patient_consent, insurance_type, insurance_id,
         group_number, service_type_id, date_of_service, plan_number, co_pay, eligibility_date,
         termination_date, payer_phone, payer_fax, relationship, referral, comments,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
         ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?35)",
        params![
            p.first_name,
            p.middle_name,
            p.last_name,
            p.birth_date.to_string(),
            p.gender.as_str(),
            p.email,
            p.marital_status.as_str(),
            p.ssn,
            p.address,
            p.address_2,
            p.city,
            p.state.as_str(),
            p.zip_code,
            p.county,
            p.phone,
            p.pcp,
            p.ref_physician_id,
            p.language.as_str(),
            p.ethnicity.as_str(),
            p.patient_consent as i32,
            p.insurance_type.as_str(),
            p.insurance_id,
            p.group_number,
            p.service_type_id,
            p.date_of_service.to_string(),
            p.plan_number,
            p.co_pay,
            p.eligibility_date.map(|d| d.to_string()),
            p.termination_date.map(|d| d.to_string()),
            p.payer_phone,
            p.payer_fax,
            p.relationship.as_str(),
            p.referral as i32,
            p.comments,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_patient(conn: &Connection, id: i64) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    conn.query_row(&sql, params![id], patient_row)
        .optional()?
        .map(PatientRow::into_patient)
        .transpose()
}

pub fn patient_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM patients WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn update_patient(conn: &Connection, id: i64, p: &PatientFields) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET first_name = ?1, middle_name = ?2, last_name = ?3, birth_date = ?4,
         gender = ?5, email = ?6, marital_status = ?7, ssn = ?8, address = ?9, address_2 = ?10,
         city = ?11, state = ?12, zip_code = ?13, county = ?14, phone = ?15, pcp = ?16,
         ref_physician_id = ?17, language = ?18, ethnicity = ?19, patient_consent = ?20,
         insurance_type = ?21, insurance_id = ?22, group_number = ?23, service_type_id = ?24,
         date_of_service = ?25, plan_number = ?26, co_pay = ?27, eligibility_date = ?28,
         termination_date = ?29, payer_phone = ?30, payer_fax = ?31, relationship = ?32,
         referral = ?33, comments = ?34, updated_at = ?35
         WHERE id = ?36",
        params![
            p.first_name,
            p.middle_name,
            p.last_name,
            p.birth_date.to_string(),
            p.gender.as_str(),
            p.email,
            p.marital_status.as_str(),
            p.ssn,
            p.address,
            p.address_2,
            p.city,
            p.state.as_str(),
            p.zip_code,
            p.county,
            p.phone,
            p.pcp,
            p.ref_physician_id,
            p.language.as_str(),
            p.ethnicity.as_str(),
            p.patient_consent as i32,
            p.insurance_type.as_str(),
            p.insurance_id,
            p.group_number,
            p.service_type_id,
            p.date_of_service.to_string(),
            p.plan_number,
            p.co_pay,
            p.eligibility_date.map(|d| d.to_string()),
            p.termination_date.map(|d| d.to_string()),
            p.payer_phone,
            p.payer_fax,
            p.relationship.as_str(),
            p.referral as i32,
            p.comments,
            format_timestamp(&Utc::now()),
            id,
        ],
    )?;
    expect_row(changed, "patient", id)
}

/// Deletes the patient; vials, templates, allergen tests, authorizations and
/// their procedures go with it through `ON DELETE CASCADE`.
pub fn delete_patient(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
    expect_row(changed, "patient", id)
}

pub fn list_patient_summaries(conn: &Connection) -> Result<Vec<PatientSummary>, DatabaseError> {
    let sql = format!(
        "SELECT p.id, p.first_name, p.middle_name, p.last_name, p.birth_date, p.insurance_type,
         p.referral, {LAST_TEST_SQL} FROM patients p ORDER BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i32>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (id, first_name, middle_name, last_name, birth_date, insurance_type, referral, last_test) =
            row?;
        summaries.push(PatientSummary {
            id,
            first_name,
            middle_name,
            last_name,
            birth_date: parse_date(&birth_date)?,
            insurance_type: InsuranceType::from_str(&insurance_type)?,
            referral: yes_no(referral != 0),
            visits_exp: NOT_AVAILABLE,
            last_test_date: render_last_test(last_test)?,
            billout_date: NOT_AVAILABLE,
        });
    }
    Ok(summaries)
}

/// Case-insensitive substring match over first, middle and last name.
pub fn search_patients(conn: &Connection, needle: &str) -> Result<Vec<PatientSearchHit>, DatabaseError> {
    let pattern = format!("%{}%", escape_like(needle));
    let sql = format!(
        "SELECT p.id, p.first_name, p.middle_name, p.last_name, p.birth_date, p.insurance_type,
         p.referral, {LAST_TEST_SQL}
         FROM patients p
         WHERE p.first_name LIKE ?1 ESCAPE '\\'
            OR p.middle_name LIKE ?1 ESCAPE '\\'
            OR p.last_name LIKE ?1 ESCAPE '\\'
         ORDER BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pattern], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i32>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut hits = Vec::new();
    for row in rows {
        let (id, first, middle, last, birth_date, insurance_type, referral, last_test) = row?;
        hits.push(PatientSearchHit {
            patient_id: id,
            patient_name: full_name(&first, middle.as_deref(), &last),
            birth_date: parse_date(&birth_date)?,
            last_test_date: render_last_test(last_test)?,
            insurance: InsuranceType::from_str(&insurance_type)?,
            referral: yes_no(referral != 0),
            visits_exp: NOT_AVAILABLE,
            billout_date: NOT_AVAILABLE,
        });
    }
    Ok(hits)
}

fn render_last_test(raw: Option<String>) -> Result<String, DatabaseError> {
    match raw {
        Some(ts) => Ok(parse_timestamp(&ts)?.date_naive().to_string()),
        None => Ok(NOT_AVAILABLE.to_string()),
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct PatientRow {
    id: i64,
    first_name: String,
    middle_name: Option<String>,
    last_name: String,
    birth_date: String,
    gender: String,
    email: Option<String>,
    marital_status: String,
    ssn: String,
    address: String,
    address_2: Option<String>,
    city: String,
    state: String,
    zip_code: String,
    county: Option<String>,
    phone: String,
    pcp: Option<String>,
    ref_physician_id: Option<i64>,
    language: String,
    ethnicity: String,
    patient_consent: i32,
    insurance_type: String,
    insurance_id: String,
    group_number: String,
    service_type_id: Option<i64>,
    date_of_service: String,
    plan_number: String,
    co_pay: Option<String>,
    eligibility_date: Option<String>,
    termination_date: Option<String>,
    payer_phone: String,
    payer_fax: String,
    relationship: String,
    referral: i32,
    comments: Option<String>,
    created_at: String,
    updated_at: String,
}

fn patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get("id")?,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        last_name: row.get("last_name")?,
        birth_date: row.get("birth_date")?,
        gender: row.get("gender")?,
        email: row.get("email")?,
        marital_status: row.get("marital_status")?,
        ssn: row.get("ssn")?,
        address: row.get("address")?,
        address_2: row.get("address_2")?,
        city: row.get("city")?,
        state: row.get("state")?,
        zip_code: row.get("zip_code")?,
        county: row.get("county")?,
        phone: row.get("phone")?,
        pcp: row.get("pcp")?,
        ref_physician_id: row.get("ref_physician_id")?,
        language: row.get("language")?,
        ethnicity: row.get("ethnicity")?,
        patient_consent: row.get("patient_consent")?,
        insurance_type: row.get("insurance_type")?,
        insurance_id: row.get("insurance_id")?,
        group_number: row.get("group_number")?,
        service_type_id: row.get("service_type_id")?,
        date_of_service: row.get("date_of_service")?,
        plan_number: row.get("plan_number")?,
        co_pay: row.get("co_pay")?,
        eligibility_date: row.get("eligibility_date")?,
        termination_date: row.get("termination_date")?,
        payer_phone: row.get("payer_phone")?,
        payer_fax: row.get("payer_fax")?,
        relationship: row.get("relationship")?,
        referral: row.get("referral")?,
        comments: row.get("comments")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl PatientRow {
    fn into_patient(self) -> Result<Patient, DatabaseError> {
        Ok(Patient {
            id: self.id,
            fields: PatientFields {
                first_name: self.first_name,
                middle_name: self.middle_name,
                last_name: self.last_name,
                birth_date: parse_date(&self.birth_date)?,
                gender: Gender::from_str(&self.gender)?,
                email: self.email,
                marital_status: MaritalStatus::from_str(&self.marital_status)?,
                ssn: self.ssn,
                address: self.address,
                address_2: self.address_2,
                city: self.city,
                state: UsState::from_str(&self.state)?,
                zip_code: self.zip_code,
                county: self.county,
                phone: self.phone,
                pcp: self.pcp,
                ref_physician_id: self.ref_physician_id,
                language: Language::from_str(&self.language)?,
                ethnicity: Ethnicity::from_str(&self.ethnicity)?,
                patient_consent: self.patient_consent != 0,
                insurance_type: InsuranceType::from_str(&self.insurance_type)?,
                insurance_id: self.insurance_id,
                group_number: self.group_number,
                service_type_id: self.service_type_id,
                date_of_service: parse_date(&self.date_of_service)?,
                plan_number: self.plan_number,
                co_pay: self.co_pay,
                eligibility_date: parse_opt_date(self.eligibility_date)?,
                termination_date: parse_opt_date(self.termination_date)?,
                payer_phone: self.payer_phone,
                payer_fax: self.payer_fax,
                relationship: Relationship::from_str(&self.relationship)?,
                referral: self.referral != 0,
                comments: self.comments,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
