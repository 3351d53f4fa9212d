use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_date, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::enums::{Arm, InjectionReaction};
use crate::models::*;

const TEMPLATE_SELECT: &str = "SELECT t.id, t.vial_id, v.name, t.dose, t.date, t.arm, t.peak_flow,
    t.tech_id, t.hcrm_applied, t.reaction, t.notes, t.vial_color, t.created_at, t.updated_at
    FROM allergy_templates t
    JOIN vials v ON v.id = t.vial_id";

pub fn insert_allergy_template(
    conn: &Connection,
    t: &AllergyTemplateFields,
) -> Result<i64, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO allergy_templates (vial_id, dose, date, arm, peak_flow, tech_id,
         hcrm_applied, reaction, notes, vial_color, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            t.vial_id,
            t.dose,
            t.date.to_string(),
            t.arm.as_str(),
            t.peak_flow,
            t.tech_id,
            t.hcrm_applied as i32,
            t.reaction.as_str(),
            t.notes,
            t.vial_color,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_allergy_template(
    conn: &Connection,
    id: i64,
) -> Result<Option<AllergyTemplate>, DatabaseError> {
    let sql = format!("{TEMPLATE_SELECT} WHERE t.id = ?1");
    conn.query_row(&sql, params![id], template_row)
        .optional()?
        .map(TemplateRow::into_template)
        .transpose()
}

/// Templates in recording order. The patient filter matches through the owning vial.
pub fn list_allergy_templates(
    conn: &Connection,
    filter: &AllergyTemplateFilter,
) -> Result<Vec<AllergyTemplate>, DatabaseError> {
    let sql = format!(
        "{TEMPLATE_SELECT}
         WHERE (?1 IS NULL OR v.patient_id = ?1)
         ORDER BY t.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![filter.patient_id], template_row)?;

    let mut templates = Vec::new();
    for row in rows {
        templates.push(row?.into_template()?);
    }
    Ok(templates)
}

pub fn update_allergy_template(
    conn: &Connection,
    id: i64,
    t: &AllergyTemplateFields,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE allergy_templates SET vial_id = ?1, dose = ?2, date = ?3, arm = ?4,
         peak_flow = ?5, tech_id = ?6, hcrm_applied = ?7, reaction = ?8, notes = ?9,
         vial_color = ?10, updated_at = ?11
         WHERE id = ?12",
        params![
            t.vial_id,
            t.dose,
            t.date.to_string(),
            t.arm.as_str(),
            t.peak_flow,
            t.tech_id,
            t.hcrm_applied as i32,
            t.reaction.as_str(),
            t.notes,
            t.vial_color,
            format_timestamp(&Utc::now()),
            id,
        ],
    )?;
    expect_row(changed, "allergy template", id)
}

pub fn delete_allergy_template(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM allergy_templates WHERE id = ?1", params![id])?;
    expect_row(changed, "allergy template", id)
}

/// One row per patient that has at least one recorded injection, ordered by
/// patient id.
pub fn fetch_last_injections(conn: &Connection) -> Result<Vec<LastInjection>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.first_name, p.middle_name, p.last_name, p.phone, MAX(t.date)
         FROM allergy_templates t
         JOIN vials v ON v.id = t.vial_id
         JOIN patients p ON p.id = v.patient_id
         GROUP BY p.id
         ORDER BY p.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut result = Vec::new();
    for row in rows {
        let (patient_id, first_name, middle_name, last_name, phone, last) = row?;
        result.push(LastInjection {
            patient_id,
            first_name,
            middle_name,
            last_name,
            phone,
            last_injection: parse_date(&last)?,
        });
    }
    Ok(result)
}

struct TemplateRow {
    id: i64,
    vial_id: i64,
    vial_name: String,
    dose: String,
    date: String,
    arm: String,
    peak_flow: String,
    tech_id: String,
    hcrm_applied: i32,
    reaction: String,
    notes: Option<String>,
    vial_color: Option<String>,
    created_at: String,
    updated_at: String,
}

fn template_row(row: &Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        vial_id: row.get(1)?,
        vial_name: row.get(2)?,
        dose: row.get(3)?,
        date: row.get(4)?,
        arm: row.get(5)?,
        peak_flow: row.get(6)?,
        tech_id: row.get(7)?,
        hcrm_applied: row.get(8)?,
        reaction: row.get(9)?,
        notes: row.get(10)?,
        vial_color: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl TemplateRow {
    fn into_template(self) -> Result<AllergyTemplate, DatabaseError> {
        Ok(AllergyTemplate {
            id: self.id,
            vial_name: self.vial_name,
            fields: AllergyTemplateFields {
                vial_id: self.vial_id,
                dose: self.dose,
                date: parse_date(&self.date)?,
                arm: Arm::from_str(&self.arm)?,
                peak_flow: self.peak_flow,
                tech_id: self.tech_id,
                hcrm_applied: self.hcrm_applied != 0,
                reaction: InjectionReaction::from_str(&self.reaction)?,
                notes: self.notes,
                vial_color: self.vial_color,
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
    fn get_carries_vial_name() {
        let conn = open_memory_database().unwrap();
        let patient_id = make_patient(&conn, "Ann", "Smith", "1001");
        let vial_id = make_vial(&conn, patient_id, "Trees");
        let id = make_template(&conn, vial_id, date(2024, 3, 1));

        let template = get_allergy_template(&conn, id).unwrap().unwrap();
        assert_eq!(template.vial_name, "Trees");
        assert_eq!(template.fields, template_fields(vial_id, date(2024, 3, 1)));
    }

    #[test]
    fn patient_filter_walks_through_vials() {
        let conn = open_memory_database().unwrap();
        let ann = make_patient(&conn, "Ann", "Smith", "1001");
        let bob = make_patient(&conn, "Bob", "Jones", "1002");
        let ann_trees = make_vial(&conn, ann, "Trees");
        let ann_mold = make_vial(&conn, ann, "Mold");
        let bob_vial = make_vial(&conn, bob, "Trees");
        make_template(&conn, ann_trees, date(2024, 3, 1));
        make_template(&conn, ann_mold, date(2024, 3, 8));
        make_template(&conn, bob_vial, date(2024, 3, 2));

        let dates: Vec<_> = list_allergy_templates(&conn, &AllergyTemplateFilter { patient_id: Some(ann) })
            .unwrap()
            .into_iter()
            .map(|t| t.fields.date)
            .collect();
        assert_eq!(dates, vec![date(2024, 3, 1), date(2024, 3, 8)]);
    }

    #[test]
    fn update_moves_template_between_vials() {
        let conn = open_memory_database().unwrap();
        let patient_id = make_patient(&conn, "Ann", "Smith", "1001");
        let first = make_vial(&conn, patient_id, "Trees");
        let second = make_vial(&conn, patient_id, "Mold");
        let id = make_template(&conn, first, date(2024, 3, 1));

        let mut fields = template_fields(second, date(2024, 3, 1));
        fields.reaction = InjectionReaction::Mm5;
        update_allergy_template(&conn, id, &fields).unwrap();

        let template = get_allergy_template(&conn, id).unwrap().unwrap();
        assert_eq!(template.vial_name, "Mold");
        assert_eq!(template.fields.reaction, InjectionReaction::Mm5);
        assert!(matches!(
            update_allergy_template(&conn, id + 100, &fields),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn last_injection_is_max_across_vials() {
        let conn = open_memory_database().unwrap();
        let ann = make_patient(&conn, "Ann", "Smith", "1001");
        let bob = make_patient(&conn, "Bob", "Jones", "1002");
        make_patient(&conn, "Cara", "Never", "1003");
        let trees = make_vial(&conn, ann, "Trees");
        let mold = make_vial(&conn, ann, "Mold");
        let bob_vial = make_vial(&conn, bob, "Trees");
        make_template(&conn, trees, date(2024, 1, 5));
        make_template(&conn, mold, date(2024, 2, 9));
        make_template(&conn, bob_vial, date(2023, 12, 1));

        let rows = fetch_last_injections(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].patient_id, rows[0].last_injection), (ann, date(2024, 2, 9)));
        assert_eq!((rows[1].patient_id, rows[1].last_injection), (bob, date(2023, 12, 1)));
    }
}
