//! Error types for Parley.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("No scenario for {org}/{role}")]
    ScenarioNotFound { org: String, role: String },

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl ParleyError {
    /// Whether this error is a client-side validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ParleyError::ScenarioNotFound { .. } | ParleyError::InvalidScenario(_)
        )
    }
}
