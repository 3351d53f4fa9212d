use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_opt_date, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const VIAL_COLUMNS: &str =
    "id, patient_id, name, expiration_date, allergens, diagnosis_codes, created_at, updated_at";

pub fn insert_vial(conn: &Connection, vial: &VialFields) -> Result<i64, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO vials (patient_id, name, expiration_date, allergens, diagnosis_codes,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            vial.patient_id,
            vial.name,
            vial.expiration_date.map(|d| d.to_string()),
            encode_list(&vial.allergens)?,
            encode_list(&vial.diagnosis_codes)?,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_vial(conn: &Connection, id: i64) -> Result<Option<Vial>, DatabaseError> {
    let sql = format!("SELECT {VIAL_COLUMNS} FROM vials WHERE id = ?1");
    conn.query_row(&sql, params![id], vial_row)
        .optional()?
        .map(VialRow::into_vial)
        .transpose()
}

/// Vials ordered by expiration date, latest first; undated vials sort last.
pub fn list_vials(conn: &Connection, filter: &VialFilter) -> Result<Vec<Vial>, DatabaseError> {
    let sql = format!(
        "SELECT {VIAL_COLUMNS} FROM vials
         WHERE (?1 IS NULL OR patient_id = ?1)
         ORDER BY expiration_date IS NULL, expiration_date DESC, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![filter.patient_id], vial_row)?;

    let mut vials = Vec::new();
    for row in rows {
        vials.push(row?.into_vial()?);
    }
    Ok(vials)
}

pub fn vial_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM vials WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn update_vial(conn: &Connection, id: i64, vial: &VialFields) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE vials SET patient_id = ?1, name = ?2, expiration_date = ?3, allergens = ?4,
         diagnosis_codes = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            vial.patient_id,
            vial.name,
            vial.expiration_date.map(|d| d.to_string()),
            encode_list(&vial.allergens)?,
            encode_list(&vial.diagnosis_codes)?,
            format_timestamp(&Utc::now()),
            id,
        ],
    )?;
    expect_row(changed, "vial", id)
}

/// Deletes the vial and, through the cascade, its injection templates.
pub fn delete_vial(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM vials WHERE id = ?1", params![id])?;
    expect_row(changed, "vial", id)
}

fn encode_list(items: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(items)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("list encoding: {e}")))
}

fn decode_list(raw: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("list decoding: {e}")))
}

struct VialRow {
    id: i64,
    patient_id: i64,
    name: String,
    expiration_date: Option<String>,
    allergens: String,
    diagnosis_codes: String,
    created_at: String,
    updated_at: String,
}

fn vial_row(row: &Row<'_>) -> rusqlite::Result<VialRow> {
    Ok(VialRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        name: row.get(2)?,
        expiration_date: row.get(3)?,
        allergens: row.get(4)?,
        diagnosis_codes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl VialRow {
    fn into_vial(self) -> Result<Vial, DatabaseError> {
        Ok(Vial {
            id: self.id,
            fields: VialFields {
                patient_id: self.patient_id,
                name: self.name,
                expiration_date: parse_opt_date(self.expiration_date)?,
                allergens: decode_list(&self.allergens)?,
                diagnosis_codes: decode_list(&self.diagnosis_codes)?,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn lists_round_trip_through_json_column() {
        let conn = open_memory_database().unwrap();
        let patient_id = make_patient(&conn, "Ann", "Smith", "1001");
        let id = make_vial(&conn, patient_id, "Vial A");

        let vial = get_vial(&conn, id).unwrap().unwrap();
        assert_eq!(vial.fields.allergens, vec!["Dust mite", "Cat"]);
        assert_eq!(vial.fields.diagnosis_codes, vec!["J30.1"]);
    }

    #[test]
    fn name_unique_per_patient() {
        let conn = open_memory_database().unwrap();
        let ann = make_patient(&conn, "Ann", "Smith", "1001");
        let bob = make_patient(&conn, "Bob", "Jones", "1002");
        make_vial(&conn, ann, "Vial A");
        make_vial(&conn, bob, "Vial A");

        let err = insert_vial(
            &conn,
            &VialFields {
                patient_id: ann,
                name: "Vial A".into(),
                expiration_date: None,
                allergens: vec![],
                diagnosis_codes: vec![],
            },
        )
        .unwrap_err();
        assert_eq!(
            err.unique_violation(),
            Some(vec!["patient_id".to_string(), "name".to_string()])
        );
    }

    #[test]
    fn filter_by_patient_and_order_by_expiration_desc() {
        let conn = open_memory_database().unwrap();
        let ann = make_patient(&conn, "Ann", "Smith", "1001");
        let bob = make_patient(&conn, "Bob", "Jones", "1002");
        for (name, exp) in [("Early", Some(date(2024, 1, 1))), ("Late", Some(date(2025, 1, 1))), ("Open", None)] {
            insert_vial(
                &conn,
                &VialFields {
                    patient_id: ann,
                    name: name.into(),
                    expiration_date: exp,
                    allergens: vec![],
                    diagnosis_codes: vec![],
                },
            )
            .unwrap();
        }
        make_vial(&conn, bob, "Other");

        let names: Vec<String> = list_vials(&conn, &VialFilter { patient_id: Some(ann) })
            .unwrap()
            .into_iter()
            .map(|v| v.fields.name)
            .collect();
        assert_eq!(names, vec!["Late", "Early", "Open"]);
        assert_eq!(list_vials(&conn, &VialFilter::default()).unwrap().len(), 4);
    }

    #[test]
    fn delete_removes_templates() {
        let conn = open_memory_database().unwrap();
        let patient_id = make_patient(&conn, "Ann", "Smith", "1001");
        let vial_id = make_vial(&conn, patient_id, "Vial A");
        let template_id = make_template(&conn, vial_id, date(2024, 3, 1));

        delete_vial(&conn, vial_id).unwrap();
        assert!(!vial_exists(&conn, vial_id).unwrap());
        assert!(crate::db::repository::get_allergy_template(&conn, template_id)
            .unwrap()
            .is_none());
    }
}
