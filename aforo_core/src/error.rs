//! Error types for the aforo counting engine.
//!
//! Only configuration loading and export I/O can fail. Normalization and
//! aggregation never return errors: bad records become invalid events and
//! repeated submissions are silent no-ops.

use thiserror::Error;

use crate::types::{Cardinal, ScopeId};

/// Errors that can occur in the aforo engine.
#[derive(Debug, Error)]
pub enum AforoError {
    /// Reading a configuration or bundle file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing or reading the CSV export failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Two access zones claim the same compass direction
    #[error("Duplicate access zone for direction {0}")]
    DuplicateZone(Cardinal),

    /// No aggregation state exists for the scope
    #[error("Unknown scope: {0}")]
    UnknownScope(ScopeId),

    /// Export table shape does not match the expected layout
    #[error("Malformed export: {0}")]
    MalformedExport(String),
}

impl AforoError {
    /// Creates a malformed export error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedExport(msg.into())
    }
}
