use thiserror::Error;

use talento_shared::ServiceError;

use crate::swipe::QueueState;

/// How a failure is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Remote call failed; the user may repeat the action.
    Transient,
    /// Input rejected before any remote call.
    Validation,
    /// The record already exists.
    Conflict,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Operation not allowed while the queue is {0:?}")]
    InvalidState(QueueState),

    #[error("No conversation is open")]
    NoOpenChannel,
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Service(e) if e.is_conflict() => FailureKind::Conflict,
            Self::Service(_) => FailureKind::Transient,
            Self::Validation(_) | Self::InvalidState(_) | Self::NoOpenChannel => {
                FailureKind::Validation
            }
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
