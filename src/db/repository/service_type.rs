use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{expect_row, format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_service_type(conn: &Connection, fields: &ServiceTypeFields) -> Result<i64, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO service_types (code, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![fields.code, fields.description, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_service_type(conn: &Connection, id: i64) -> Result<Option<ServiceType>, DatabaseError> {
    conn.query_row(
        "SELECT id, code, description, created_at, updated_at FROM service_types WHERE id = ?1",
        params![id],
        service_type_row,
    )
    .optional()?
    .map(ServiceTypeRow::into_service_type)
    .transpose()
}

/// All service types, ordered by code.
pub fn list_service_types(conn: &Connection) -> Result<Vec<ServiceType>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, code, description, created_at, updated_at FROM service_types ORDER BY code",
    )?;
    let rows = stmt.query_map([], service_type_row)?;

    let mut types = Vec::new();
    for row in rows {
        types.push(row?.into_service_type()?);
    }
    Ok(types)
}

pub fn service_type_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM service_types WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn update_service_type(
    conn: &Connection,
    id: i64,
    fields: &ServiceTypeFields,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE service_types SET code = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![fields.code, fields.description, format_timestamp(&Utc::now()), id],
    )?;
    expect_row(changed, "service type", id)
}

pub fn delete_service_type(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM service_types WHERE id = ?1", params![id])?;
    expect_row(changed, "service type", id)
}

struct ServiceTypeRow {
    id: i64,
    code: String,
    description: String,
    created_at: String,
    updated_at: String,
}

fn service_type_row(row: &Row<'_>) -> rusqlite::Result<ServiceTypeRow> {
    Ok(ServiceTypeRow {
        id: row.get(0)?,
        code: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl ServiceTypeRow {
    fn into_service_type(self) -> Result<ServiceType, DatabaseError> {
        Ok(ServiceType {
            id: self.id,
            fields: ServiceTypeFields {
                code: self.code,
                description: self.description,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
