use thiserror::Error;

use talento_shared::ServiceError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database or blob directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("Duplicate record in {resource}")]
    Conflict { resource: String },

    /// The record body is not a usable JSON object.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// JSON (de)serialization of a stored body failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Blob path escapes the storage root or is empty.
    #[error("Invalid blob path: {0}")]
    BlobPath(String),

    /// Blob exceeds the configured size limit.
    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Map SQLite constraint violations to [`StoreError::Conflict`].
    pub(crate) fn from_write(e: rusqlite::Error, resource: &str) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict {
                    resource: resource.to_string(),
                }
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { resource } => {
                ServiceError::conflict(format!("duplicate record in {resource}"))
            }
            StoreError::InvalidRecord(msg) => ServiceError::InvalidRecord(msg),
            StoreError::Json(e) => ServiceError::InvalidRecord(e.to_string()),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}
