//! Gatekeeper error types

use thiserror::Error;

/// Errors that can occur during gatekeeper operations
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] concord_llm::LlmError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for GatekeeperError {
    fn from(err: toml::de::Error) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}
