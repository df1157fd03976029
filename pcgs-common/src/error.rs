//! Common error types for PCGS

use crate::scalar::ScalarLevel;
use serde::Serialize;
use thiserror::Error;

/// Common result type for PCGS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across PCGS crates
#[derive(Error, Debug)]
pub enum Error {
    /// Scalar structure violation (always rejected, never auto-corrected)
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// Reference to an unknown term, profile or field
    #[error("Referential error: {0}")]
    Referential(#[from] ReferentialError),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Exclusive course lock could not be acquired in time
    #[error("Timed out after {waited_ms} ms waiting for course '{course_id}' lock")]
    LockTimeout { course_id: String, waited_ms: u64 },

    /// Operation aborted through its cancellation token
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Violations of the scalar hierarchy rules
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralError {
    #[error("malformed {level} serial '{serial}': {reason}")]
    MalformedSerial {
        level: ScalarLevel,
        serial: String,
        reason: String,
    },

    #[error("{level} '{serial}' has empty text")]
    EmptyText { level: ScalarLevel, serial: String },

    #[error("{level} '{serial}' references missing parent '{parent_serial}'")]
    OrphanParent {
        level: ScalarLevel,
        serial: String,
        parent_serial: String,
    },

    #[error("serial '{serial}' already exists for {level}")]
    DuplicateSerial { level: ScalarLevel, serial: String },

    #[error("invalid {level} ordering under {parent}: {reason}")]
    InvalidPermutation {
        level: ScalarLevel,
        parent: String,
        reason: String,
    },
}

/// Lookups against registries that found no matching key
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferentialError {
    #[error("unknown term '{term}'")]
    UnknownTerm { term: String },

    #[error("unknown template profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("field '{field}' is not mapped in profile '{profile}'")]
    UnmappedField { profile: String, field: String },
}

impl Error {
    /// True for failures that concern a single row or entry rather than the
    /// whole operation.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural(_))
    }
}
