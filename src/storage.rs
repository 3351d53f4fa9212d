//! Uploaded authorization documents on disk, under `<media>/authorization_docs/`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

pub const DOCS_SUBDIR: &str = "authorization_docs";

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Refusing path outside the media directory: {0}")]
    OutsideMedia(String),
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    media_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        let docs = self.media_dir.join(DOCS_SUBDIR);
        fs::create_dir_all(&docs).map_err(|source| StorageError::Io { path: docs, source })
    }

    /// Writes the file under a unique name and returns its path relative to
    /// the media directory.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.ensure_dirs()?;
        let stored_name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original_name));
        let relative = format!("{DOCS_SUBDIR}/{stored_name}");
        let path = self.media_dir.join(DOCS_SUBDIR).join(&stored_name);
        fs::write(&path, bytes).map_err(|source| StorageError::Io { path, source })?;
        Ok(relative)
    }

    /// Removes a previously saved document. A file that is already gone is
    /// not an error.
    pub fn remove(&self, relative: &str) -> Result<(), StorageError> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Best-effort removal of a set of saved documents, logging failures.
    pub fn discard(&self, relatives: &[String]) {
        for relative in relatives {
            if let Err(e) = self.remove(relative) {
                tracing::warn!(error = %e, relative, "Failed to remove stored document");
            }
        }
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(relative);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::OutsideMedia(relative.to_string()));
        }
        Ok(self.media_dir.join(rel))
    }
}

/// Keeps alphanumerics, `.`, `-` and `_`; anything else becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.replace("..", "");
    let sanitized: String = sanitized.chars().take(MAX_NAME_CHARS).collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "document".into()
    } else {
        sanitized
    }
}
