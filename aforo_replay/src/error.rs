//! Error types for the replay harness.

use aforo_core::AforoError;
use thiserror::Error;

/// Errors raised while loading bundles or writing replay artifacts.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The engine rejected the bundle or an export failed
    #[error("Engine error: {0}")]
    Engine(#[from] AforoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scenario name not recognised on the command line
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl ReplayError {
    /// Creates an unknown scenario error.
    pub fn unknown_scenario(name: impl Into<String>) -> Self {
        Self::UnknownScenario(name.into())
    }
}
