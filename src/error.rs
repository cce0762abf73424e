//! Error kinds for the ingest and analytics pipeline.
//!
//! Mirrors the propagation policy in the specification: per-line and
//! per-rule failures are counted, not raised, through this type. Only
//! failures that mean "cannot proceed for this file/job" become a
//! `PipelineError`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to decode log blob: {0}")]
    Decode(String),

    #[error("rule engine error in rule '{rule}': {message}")]
    Rule { rule: String, message: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("job deadline exceeded after processing {lines_processed} lines")]
    DeadlineExceeded { lines_processed: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PipelineError::Config(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        PipelineError::Decode(msg.into())
    }

    pub fn rule<S: Into<String>>(rule: S, message: S) -> Self {
        PipelineError::Rule { rule: rule.into(), message: message.into() }
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        PipelineError::Persistence(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        PipelineError::NotFound(msg.into())
    }

    /// Whether this error is worth retrying with backoff (§7, PersistenceError).
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Persistence(_) | PipelineError::Database(_))
    }
}
