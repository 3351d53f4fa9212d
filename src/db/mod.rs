pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// Columns named by a failed UNIQUE constraint, without the table prefix.
    ///
    /// SQLite reports these as `UNIQUE constraint failed: vials.patient_id, vials.name`.
    pub fn unique_violation(&self) -> Option<Vec<String>> {
        let DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, Some(message))) = self else {
            return None;
        };
        if err.code != rusqlite::ErrorCode::ConstraintViolation {
            return None;
        }
        let columns = message.strip_prefix("UNIQUE constraint failed: ")?;
        Some(
            columns
                .split(',')
                .map(|c| {
                    let c = c.trim();
                    c.rsplit_once('.').map(|(_, col)| col).unwrap_or(c).to_string()
                })
                .collect(),
        )
    }

    pub fn not_found(entity_type: &str, id: i64) -> Self {
        DatabaseError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }
}
