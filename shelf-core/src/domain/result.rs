//! Result and error types for the core library

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The record changed since the caller read it (version stamp mismatch)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The registry has no student for the admission number at commit time
    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Login failed: unknown username or wrong password")]
    Unauthenticated,

    #[error("Student registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine-readable error classification used in batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateKey,
    NotFound,
    InvalidState,
    Conflict,
    Validation,
    Verification,
    Unauthenticated,
    RegistryUnavailable,
    StoreUnavailable,
    Config,
    Io,
    Json,
}

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a storage error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateKey(_) => ErrorKind::DuplicateKey,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Verification(_) => ErrorKind::Verification,
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::RegistryUnavailable(_) => ErrorKind::RegistryUnavailable,
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }

    /// Only registry transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RegistryUnavailable(_))
    }
}

/// Engine failures are classified by message: DuckDB reports every
/// constraint violation through the same error variant.
impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if is_duplicate_key_message(&msg) {
            Error::DuplicateKey(msg)
        } else {
            Error::StoreUnavailable(msg)
        }
    }
}

fn is_duplicate_key_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("duplicate key")
        || lower.contains("violates unique constraint")
        || lower.contains("violates primary key constraint")
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
