//! Trait definitions for external interactions
//!
//! These traits define the boundaries between extraction logic and the
//! services it consumes. Infrastructure implementations live in other crates.
//! The traits are synchronous; async callers run them on a blocking thread
//! under an explicit timeout.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// System prompt (role, rules, output schema)
    pub system_prompt: String,
    /// User prompt (the document excerpt)
    pub user_prompt: String,
    /// Ask the backend for JSON-only output when it supports it
    pub json_mode: bool,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Budget for the call in milliseconds
    pub timeout_ms: u64,
}

impl CompletionRequest {
    /// Create a JSON-mode request with extraction-friendly defaults
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            json_mode: true,
            temperature: 0.1,
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }

    /// Override the timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Override JSON mode
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Trait for language-model completion backends
///
/// Implemented by the infrastructure layer (concord-llm)
pub trait CompletionProvider {
    /// Error type for completion operations
    type Error;

    /// Generate a completion
    fn complete(&self, request: &CompletionRequest) -> Result<String, Self::Error>;

    /// Name of the model answering requests
    fn model_name(&self) -> &str;

    /// Cheap capability probe; must not perform a completion
    fn is_available(&self) -> bool {
        true
    }
}

/// Options for document conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Run OCR on scanned pages
    pub ocr: bool,
    /// Extract tables
    pub with_tables: bool,
    /// Extract image metadata
    pub with_images: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            ocr: true,
            with_tables: true,
            with_images: false,
        }
    }
}

/// A table found during conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedTable {
    /// Table rendered as a markdown pipe table
    pub markdown: String,
    /// Row count
    pub rows: usize,
    /// Column count
    pub cols: usize,
}

/// Normalized output of a document conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedDocument {
    /// Document text (markdown)
    pub text: String,
    /// Tables found in the document
    pub tables: Vec<ConvertedTable>,
    /// Number of pages
    pub page_count: usize,
}

/// Trait for document-to-text conversion services
///
/// Implemented by the application layer (concord-extractor)
pub trait DocumentConverter {
    /// Error type for conversion operations
    type Error;

    /// Convert a file into text and tables
    fn convert(&self, path: &Path, options: &ConversionOptions) -> Result<ConvertedDocument, Self::Error>;

    /// Cheap capability probe
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_defaults() {
        let request = CompletionRequest::new("system", "user").with_timeout_ms(5_000);
        assert!(request.json_mode);
        assert_eq!(request.timeout_ms, 5_000);
        assert!(!request.clone().with_json_mode(false).json_mode);
    }

    #[test]
    fn test_conversion_options_default_includes_tables() {
        let options = ConversionOptions::default();
        assert!(options.with_tables);
        assert!(options.ocr);
        assert!(!options.with_images);
    }
}
