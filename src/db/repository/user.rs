use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{expect_row, format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, password_hash, format_timestamp(&Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "SELECT id, username, email, password_hash, created_at FROM users WHERE id = ?1", params![id])
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    query_user(
        conn,
        "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?1",
        params![username],
    )
}

pub fn update_user_password(conn: &Connection, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, id],
    )?;
    expect_row(changed, "user", id)
}

fn query_user(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(sql, params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()?;

    row.map(|(id, username, email, password_hash, created_at)| {
        Ok(User {
            id,
            username,
            email,
            password_hash,
            created_at: parse_timestamp(&created_at)?,
        })
    })
    .transpose()
}
