use thiserror::Error;

use crate::constants::CONFLICT_CODE;

/// Failure reported by a collaborator service (records, realtime, blobs,
/// key-value settings).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl ServiceError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Rejected {
            code: CONFLICT_CODE.to_string(),
            message: message.into(),
        }
    }

    /// Whether the persistence layer refused the write because the record
    /// already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if code == CONFLICT_CODE)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidRecord(e.to_string())
    }
}
