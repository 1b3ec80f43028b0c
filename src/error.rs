//! Error taxonomy shared by ingestion, storage and aggregation
//!
//! Every variant degrades to "skip this unit of work". Nothing here is
//! meant to terminate the host process.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeardError {
    /// Malformed or incomplete inbound payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Required normalized field missing or unparseable
    #[error("Validation error: {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store connection could not be opened or its lock is poisoned
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The feed ingestion task is no longer receiving
    #[error("Feed listener stopped")]
    ListenerClosed,

    /// Read or publish step of a recomputation failed
    #[error("Aggregation failed during {stage}: {reason}")]
    Aggregation { stage: &'static str, reason: String },

    #[error("Invalid configuration value: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeardError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        HeardError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn aggregation(stage: &'static str, err: impl std::fmt::Display) -> Self {
        HeardError::Aggregation {
            stage,
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeardError {
    fn from(err: serde_json::Error) -> Self {
        HeardError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HeardError>;
