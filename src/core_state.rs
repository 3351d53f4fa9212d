//! Shared application state handed to every request handler.
//!
//! Holds no open connection: handlers call [`CoreState::open_db`] and get a
//! fresh SQLite connection for the duration of the request.

use std::path::PathBuf;

use chrono::Duration;
use rand::RngCore;

use crate::auth::{TokenIssuer, DEFAULT_ITERATIONS};
use crate::config::AppConfig;
use crate::db;
use crate::storage::{DocumentStore, StorageError};

pub struct CoreState {
    db_path: PathBuf,
    pub documents: DocumentStore,
    pub tokens: TokenIssuer,
    /// PBKDF2 rounds for newly hashed passwords.
    pub password_iterations: u32,
    pub max_upload_bytes: usize,
}

impl CoreState {
    /// Prepares the data and media directories and brings the schema up to
    /// date before the first request.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| {
            CoreError::Storage(StorageError::Io {
                path: config.data_dir.clone(),
                source,
            })
        })?;

        let documents = DocumentStore::new(config.media_dir());
        documents.ensure_dirs()?;

        let secret = match &config.secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!("MEDOFFICE_SECRET not set; tokens will not survive a restart");
                random_secret()
            }
        };

        let state = Self {
            db_path: config.db_path(),
            documents,
            tokens: TokenIssuer::new(secret, config.access_ttl, config.refresh_ttl),
            password_iterations: DEFAULT_ITERATIONS,
            max_upload_bytes: config.max_upload_bytes,
        };
        drop(state.open_db()?);
        tracing::info!(db = %state.db_path.display(), "Database ready");
        Ok(state)
    }

    /// State over an explicit database file and media directory, with a
    /// fixed secret and a cheap password hash. Used by tests.
    pub fn for_paths(db_path: PathBuf, media_dir: PathBuf, secret: &[u8], password_iterations: u32) -> Self {
        Self {
            db_path,
            documents: DocumentStore::new(media_dir),
            tokens: TokenIssuer::new(secret.to_vec(), Duration::minutes(5), Duration::hours(24)),
            password_iterations,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }

    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
