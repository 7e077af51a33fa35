//! Error types for the Extractor

use concord_llm::LlmError;
use concord_retrieval::{EmbeddingError, VectorIndexError};
use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// A collaborator (converter, model, embedding backend) is missing
    #[error("Unavailable dependency: {0}")]
    UnavailableDependency(String),

    /// Operation exceeded its time budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Model output contained no usable JSON
    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),

    /// Document conversion failed
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding or vector index error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// No strategy with this name is registered
    #[error("Strategy not registered: {0}")]
    NotRegistered(String),

    /// Strategy is registered but reports itself unavailable
    #[error("Strategy unavailable: {0}")]
    Unavailable(String),

    /// Strategy run ended abnormally (panic or cancelled task)
    #[error("Strategy failed: {0}")]
    StrategyFailed(String),

    /// Text exceeds maximum length
    #[error("Text too long: {0} chars (max: {1})")]
    TextTooLong(usize, usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

impl From<LlmError> for ExtractorError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(ms) => ExtractorError::Timeout(format!("model call after {}ms", ms)),
            LlmError::UnparsableResponse(s) => ExtractorError::UnparsableResponse(s),
            LlmError::Unavailable(s) => ExtractorError::UnavailableDependency(s),
            LlmError::ModelNotAvailable(m) => {
                ExtractorError::UnavailableDependency(format!("model {}", m))
            }
            other => ExtractorError::Llm(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for ExtractorError {
    fn from(e: EmbeddingError) -> Self {
        ExtractorError::Embedding(e.to_string())
    }
}

impl From<VectorIndexError> for ExtractorError {
    fn from(e: VectorIndexError) -> Self {
        ExtractorError::Embedding(e.to_string())
    }
}
