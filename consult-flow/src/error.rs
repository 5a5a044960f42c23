use thiserror::Error;

use crate::session::Stage;

#[derive(Error, Debug)]
pub enum ConsultError {
    /// A retrieval, completion or document lookup call failed
    #[error("External service error: {0}")]
    External(String),

    /// The model answered, but not in the shape we asked for
    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    /// User input was rejected; nothing was changed
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Please fill in all required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    #[error("Action '{action}' is not available in stage '{stage}'")]
    InvalidAction { action: String, stage: Stage },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No handler registered for stage: {0}")]
    HandlerNotFound(Stage),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsultError {
    pub fn external(err: impl std::fmt::Display) -> Self {
        Self::External(err.to_string())
    }

    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// The raw model output attached to the error, if any, for diagnosis
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ConsultError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsultError>;
