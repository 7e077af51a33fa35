//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's local LLM API.
//!
//! # Features
//!
//! - Blocking HTTP communication with the Ollama API
//! - Configurable endpoint and model
//! - JSON mode, temperature and token limits passed through
//! - Retry logic with exponential backoff
//! - Timeout handling
//!
//! The provider is synchronous. Inside a Tokio runtime, call it through
//! [`ModelClient`](crate::ModelClient), which moves the call to the blocking
//! pool.
//!
//! # Examples
//!
//! ```no_run
//! use concord_llm::{ModelClient, OllamaProvider};
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "qwen2.5:7b");
//! let client = ModelClient::new(provider);
//! ```

use crate::LlmError;
use concord_domain::traits::{CompletionProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default connect timeout (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ollama API provider for local LLM inference
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    max_retries: u32,
    client: OnceLock<reqwest::blocking::Client>,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "qwen2.5:7b")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            client: OnceLock::new(),
        }
    }

    /// Create a new Ollama provider on `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the maximum number of attempts (at least one)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Endpoint this provider talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check that the server answers and lists the configured model
    ///
    /// Performs a network round trip, unlike `is_available`.
    pub fn ping(&self) -> Result<(), LlmError> {
        #[derive(Deserialize)]
        struct Tags {
            models: Vec<TagModel>,
        }
        #[derive(Deserialize)]
        struct TagModel {
            name: String,
        }

        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client()?
            .get(&url)
            .timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .send()
            .map_err(|e| LlmError::Unavailable(format!("{}: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(LlmError::Unavailable(format!("HTTP {}", response.status())));
        }

        let tags: Tags = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse tags: {}", e)))?;
        if tags.models.iter().any(|m| m.name == self.model) {
            Ok(())
        } else {
            Err(LlmError::ModelNotAvailable(self.model.clone()))
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, LlmError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Unavailable(format!("HTTP client: {}", e)))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.user_prompt,
            system: &request.system_prompt,
            stream: false,
            format: request.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn send_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client()?
            .post(&url)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&self.request_body(request))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout_ms)
                } else {
                    LlmError::Communication(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotAvailable(self.model.clone()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitExceeded);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Communication(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json::<OllamaGenerateResponse>()
            .map(|r| r.response)
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout_ms)
                } else {
                    LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                }
            })
    }
}

impl CompletionProvider for OllamaProvider {
    type Error = LlmError;

    fn complete(&self, request: &CompletionRequest) -> Result<String, Self::Error> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_once(request) {
                Ok(text) => {
                    debug!(model = %self.model, chars = text.len(), "Ollama response received");
                    return Ok(text);
                }
                // Timeouts already consumed the caller's budget
                Err(e @ (LlmError::Communication(_) | LlmError::RateLimitExceeded))
                    if attempts < self.max_retries =>
                {
                    // Exponential backoff: 1s, 2s, 4s, etc.
                    let delay = Duration::from_secs(2u64.pow(attempts - 1));
                    warn!(attempt = attempts, error = %e, "Ollama request failed, retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
