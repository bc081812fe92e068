use thiserror::Error;
use warp::http::StatusCode;

use crate::session::SessionState;

/// Custom error types for the proctor server
#[derive(Debug, Error)]
pub enum ProctorError {
    /// Registry lookup errors
    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Participant {0} not found in session")]
    ParticipantNotFound(String),

    /// Admin secret did not match the one set at creation
    #[error("Invalid admin secret for session {0}")]
    Unauthorized(String),

    #[error("Session {code} is {state:?}, operation requires Waiting")]
    InvalidState { code: String, state: SessionState },

    #[error("Allotted time of {0}s is out of range")]
    InvalidDuration(u64),

    /// Persistence errors
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Process scan failed: {0}")]
    Scan(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using ProctorError
pub type Result<T> = std::result::Result<T, ProctorError>;

impl ProctorError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        ProctorError::Internal(msg.into())
    }

    /// HTTP status a handler should answer with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProctorError::SessionNotFound(_) | ProctorError::ParticipantNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ProctorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProctorError::InvalidState { .. } => StatusCode::CONFLICT,
            ProctorError::InvalidDuration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ProctorError {
    fn from(err: std::io::Error) -> Self {
        ProctorError::Io(err.to_string())
    }
}
