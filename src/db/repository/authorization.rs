use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_date, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const ENTRY_COLUMNS: &str = "id, patient_id, drug_name, dose, frequency, insurance, auth_number,
    expiration_date, at_home, cost_estimate, visit_history, icd10_codes, procedure_codes,
    uploaded_doc, created_at, updated_at";

const PROCEDURE_COLUMNS: &str = "id, authorization_entry_id, code, units, start_date, end_date,
    frequency, description, created_at, updated_at";

/// Insert every entry and its procedures in one transaction. Either all rows
/// land or none do. Ids are returned in input order.
pub fn insert_authorization_batch(
    conn: &Connection,
    entries: &[NewAuthorization],
) -> Result<Vec<i64>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let now = format_timestamp(&Utc::now());

    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let f = &entry.fields;
        tx.execute(
            "INSERT INTO authorization_entries (patient_id, drug_name, dose, frequency,
             insurance, auth_number, expiration_date, at_home, cost_estimate, visit_history,
             icd10_codes, procedure_codes, uploaded_doc, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                f.patient_id,
                f.drug_name,
                f.dose,
                f.frequency,
                f.insurance,
                f.auth_number,
                f.expiration_date.to_string(),
                f.at_home as i32,
                f.cost_estimate,
                f.visit_history,
                f.icd10_codes,
                f.procedure_codes,
                entry.uploaded_doc,
                now,
            ],
        )?;
        let entry_id = tx.last_insert_rowid();
        insert_procedures(&tx, entry_id, &entry.procedures, &now)?;
        ids.push(entry_id);
    }

    tx.commit()?;
    Ok(ids)
}

pub fn get_authorization(
    conn: &Connection,
    id: i64,
) -> Result<Option<AuthorizationEntry>, DatabaseError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM authorization_entries WHERE id = ?1");
    let Some(row) = conn.query_row(&sql, params![id], entry_row).optional()? else {
        return Ok(None);
    };
    let procedures = procedures_for(conn, &[id])?.remove(&id).unwrap_or_default();
    row.into_entry(procedures).map(Some)
}

/// A patient's authorizations in creation order, each with its procedures.
pub fn list_authorizations_for_patient(
    conn: &Connection,
    patient_id: i64,
) -> Result<Vec<AuthorizationEntry>, DatabaseError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM authorization_entries WHERE patient_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![patient_id], entry_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut procedures = procedures_for(conn, &ids)?;

    rows.into_iter()
        .map(|row| {
            let lines = procedures.remove(&row.id).unwrap_or_default();
            row.into_entry(lines)
        })
        .collect()
}

/// Overwrite the entry's fields and swap its whole procedure set, atomically.
/// The stored document is left untouched.
pub fn replace_authorization(
    conn: &Connection,
    id: i64,
    fields: &AuthorizationFields,
    procedures: &[ProcedureFields],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let now = format_timestamp(&Utc::now());

    let changed = tx.execute(
        "UPDATE authorization_entries SET patient_id = ?1, drug_name = ?2, dose = ?3,
         frequency = ?4, insurance = ?5, auth_number = ?6, expiration_date = ?7, at_home = ?8,
         cost_estimate = ?9, visit_history = ?10, icd10_codes = ?11, procedure_codes = ?12,
         updated_at = ?13
         WHERE id = ?14",
        params![
            fields.patient_id,
            fields.drug_name,
            fields.dose,
            fields.frequency,
            fields.insurance,
            fields.auth_number,
            fields.expiration_date.to_string(),
            fields.at_home as i32,
            fields.cost_estimate,
            fields.visit_history,
            fields.icd10_codes,
            fields.procedure_codes,
            now,
            id,
        ],
    )?;
    expect_row(changed, "authorization entry", id)?;

    tx.execute(
        "DELETE FROM procedure_details WHERE authorization_entry_id = ?1",
        params![id],
    )?;
    insert_procedures(&tx, id, procedures, &now)?;

    tx.commit()?;
    Ok(())
}

/// Delete the entry (procedures cascade). Returns the stored document path so
/// the caller can remove the file.
pub fn delete_authorization(conn: &Connection, id: i64) -> Result<Option<String>, DatabaseError> {
    let doc: Option<Option<String>> = conn
        .query_row(
            "SELECT uploaded_doc FROM authorization_entries WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(doc) = doc else {
        return Err(DatabaseError::not_found("authorization entry", id));
    };
    conn.execute("DELETE FROM authorization_entries WHERE id = ?1", params![id])?;
    Ok(doc)
}

fn insert_procedures(
    conn: &Connection,
    entry_id: i64,
    procedures: &[ProcedureFields],
    now: &str,
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO procedure_details (authorization_entry_id, code, units, start_date,
         end_date, frequency, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )?;
    for p in procedures {
        stmt.execute(params![
            entry_id,
            p.code,
            p.units,
            p.start_date.to_string(),
            p.end_date.to_string(),
            p.frequency,
            p.description,
            now,
        ])?;
    }
    Ok(())
}

/// Procedures grouped by owning entry, each group in insertion order.
fn procedures_for(
    conn: &Connection,
    entry_ids: &[i64],
) -> Result<HashMap<i64, Vec<ProcedureDetail>>, DatabaseError> {
    let mut grouped: HashMap<i64, Vec<ProcedureDetail>> = HashMap::new();
    if entry_ids.is_empty() {
        return Ok(grouped);
    }

    let sql = format!(
        "SELECT {PROCEDURE_COLUMNS} FROM procedure_details
         WHERE authorization_entry_id IN (SELECT value FROM json_each(?1))
         ORDER BY id"
    );
    let ids_json = serde_json::to_string(entry_ids)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("id list encoding: {e}")))?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![ids_json], procedure_row)?;
    for row in rows {
        let (entry_id, detail) = row?.into_detail()?;
        grouped.entry(entry_id).or_default().push(detail);
    }
    Ok(grouped)
}

struct EntryRow {
    id: i64,
    patient_id: i64,
    drug_name: String,
    dose: String,
    frequency: String,
    insurance: String,
    auth_number: String,
    expiration_date: String,
    at_home: i32,
    cost_estimate: String,
    visit_history: String,
    icd10_codes: String,
    procedure_codes: String,
    uploaded_doc: Option<String>,
    created_at: String,
    updated_at: String,
}

fn entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        drug_name: row.get(2)?,
        dose: row.get(3)?,
        frequency: row.get(4)?,
        insurance: row.get(5)?,
        auth_number: row.get(6)?,
        expiration_date: row.get(7)?,
        at_home: row.get(8)?,
        cost_estimate: row.get(9)?,
        visit_history: row.get(10)?,
        icd10_codes: row.get(11)?,
        procedure_codes: row.get(12)?,
        uploaded_doc: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl EntryRow {
    fn into_entry(self, procedures: Vec<ProcedureDetail>) -> Result<AuthorizationEntry, DatabaseError> {
        Ok(AuthorizationEntry {
            id: self.id,
            fields: AuthorizationFields {
                patient_id: self.patient_id,
                drug_name: self.drug_name,
                dose: self.dose,
                frequency: self.frequency,
                insurance: self.insurance,
                auth_number: self.auth_number,
                expiration_date: parse_date(&self.expiration_date)?,
                at_home: self.at_home != 0,
                cost_estimate: self.cost_estimate,
                visit_history: self.visit_history,
                icd10_codes: self.icd10_codes,
                procedure_codes: self.procedure_codes,
            },
            uploaded_doc: self.uploaded_doc,
            procedures,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct ProcedureRow {
    id: i64,
    entry_id: i64,
    code: String,
    units: u32,
    start_date: String,
    end_date: String,
    frequency: String,
    description: String,
    created_at: String,
    updated_at: String,
}

fn procedure_row(row: &Row<'_>) -> rusqlite::Result<ProcedureRow> {
    Ok(ProcedureRow {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        code: row.get(2)?,
        units: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        frequency: row.get(6)?,
        description: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl ProcedureRow {
    fn into_detail(self) -> Result<(i64, ProcedureDetail), DatabaseError> {
        Ok((
            self.entry_id,
            ProcedureDetail {
                id: self.id,
                fields: ProcedureFields {
                    code: self.code,
                    units: self.units,
                    start_date: parse_date(&self.start_date)?,
                    end_date: parse_date(&self.end_date)?,
                    frequency: self.frequency,
                    description: self.description,
                },
                created_at: parse_timestamp(&self.created_at)?,
                updated_at: parse_timestamp(&self.updated_at)?,
            },
        ))
    }
}
