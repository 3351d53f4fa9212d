use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::enums::Degree;
use crate::models::*;

const PHYSICIAN_COLUMNS: &str = "id, user_id, name, degree, created_at, updated_at";

pub fn insert_physician(
    conn: &Connection,
    user_id: i64,
    fields: &PhysicianFields,
) -> Result<i64, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO physicians (user_id, name, degree, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![user_id, fields.name, fields.degree.as_str(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_physician(conn: &Connection, id: i64) -> Result<Option<Physician>, DatabaseError> {
    let sql = format!("SELECT {PHYSICIAN_COLUMNS} FROM physicians WHERE id = ?1");
    conn.query_row(&sql, params![id], physician_row)
        .optional()?
        .map(PhysicianRow::into_physician)
        .transpose()
}

pub fn get_physician_by_user(conn: &Connection, user_id: i64) -> Result<Option<Physician>, DatabaseError> {
    let sql = format!("SELECT {PHYSICIAN_COLUMNS} FROM physicians WHERE user_id = ?1");
    conn.query_row(&sql, params![user_id], physician_row)
        .optional()?
        .map(PhysicianRow::into_physician)
        .transpose()
}

pub fn list_physicians(conn: &Connection) -> Result<Vec<Physician>, DatabaseError> {
    let sql = format!("SELECT {PHYSICIAN_COLUMNS} FROM physicians ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], physician_row)?;

    let mut physicians = Vec::new();
    for row in rows {
        physicians.push(row?.into_physician()?);
    }
    Ok(physicians)
}

pub fn physician_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM physicians WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn update_physician(conn: &Connection, id: i64, fields: &PhysicianFields) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE physicians SET name = ?1, degree = ?2, updated_at = ?3 WHERE id = ?4",
        params![fields.name, fields.degree.as_str(), format_timestamp(&Utc::now()), id],
    )?;
    expect_row(changed, "physician", id)
}

/// Patients referred by this physician keep their record with the link cleared.
pub fn delete_physician(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM physicians WHERE id = ?1", params![id])?;
    expect_row(changed, "physician", id)
}

struct PhysicianRow {
    id: i64,
    user_id: i64,
    name: String,
    degree: String,
    created_at: String,
    updated_at: String,
}

fn physician_row(row: &Row<'_>) -> rusqlite::Result<PhysicianRow> {
    Ok(PhysicianRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        degree: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl PhysicianRow {
    fn into_physician(self) -> Result<Physician, DatabaseError> {
        Ok(Physician {
            id: self.id,
            user_id: self.user_id,
            fields: PhysicianFields {
                name: self.name,
                degree: Degree::from_str(&self.degree)?,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
