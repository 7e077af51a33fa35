//! Concord LLM Provider Layer
//!
//! Pluggable completion providers plus the async adapter the extraction
//! pipeline talks to.
//!
//! # Architecture
//!
//! Providers implement the synchronous `CompletionProvider` trait from
//! `concord-domain`. [`ModelClient`] wraps a provider and exposes the
//! object-safe async [`ModelService`] trait, running every call on a blocking
//! thread under a timeout.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic mock for testing
//! - `OllamaProvider`: Local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use concord_llm::MockProvider;
//! use concord_domain::traits::{CompletionProvider, CompletionRequest};
//!
//! let provider = MockProvider::new(r#"{"contractNo": "CT-001"}"#);
//! let request = CompletionRequest::new("system", "user");
//! assert_eq!(provider.complete(&request).unwrap(), r#"{"contractNo": "CT-001"}"#);
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod ollama;
pub mod response;

use concord_domain::traits::{CompletionProvider, CompletionRequest};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub use client::{ModelClient, ModelService};
pub use ollama::OllamaProvider;
pub use response::extract_json;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Backend is not reachable or not configured
    #[error("Model backend unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its time budget
    #[error("Model call timed out after {0}ms")]
    Timeout(u64),

    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Output contained no recoverable JSON
    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl LlmError {
    /// True for errors worth retrying with the same request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout(_) | LlmError::Communication(_) | LlmError::RateLimitExceeded
        )
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(LlmError),
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, MockReply)>,
    queue: VecDeque<MockReply>,
    requests: Vec<CompletionRequest>,
}

/// Mock LLM provider for deterministic testing
///
/// Replies are chosen in this order: queued replies (first in, first out),
/// then the first rule whose key is a substring of the system or user
/// prompt, then the default response.
///
/// # Examples
///
/// ```
/// use concord_llm::MockProvider;
/// use concord_domain::traits::{CompletionProvider, CompletionRequest};
///
/// let provider = MockProvider::new("{}");
/// provider.add_response("付款", r#"{"paymentMethod": "银行转账"}"#);
///
/// let request = CompletionRequest::new("extract", "付款方式：银行转账");
/// assert!(provider.complete(&request).unwrap().contains("银行转账"));
/// assert_eq!(provider.call_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    model: String,
    available: bool,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            model: "mock".to_string(),
            available: true,
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A provider that reports itself unavailable
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Sleep before answering, to simulate a slow backend
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reply with `response` whenever a prompt contains `key`
    pub fn add_response(&self, key: impl Into<String>, response: impl Into<String>) {
        self.lock()
            .rules
            .push((key.into(), MockReply::Text(response.into())));
    }

    /// Fail whenever a prompt contains `key`
    pub fn add_error(&self, key: impl Into<String>, error: LlmError) {
        self.lock().rules.push((key.into(), MockReply::Fail(error)));
    }

    /// Queue a reply consumed by the next call, ahead of any rule
    pub fn push_response(&self, response: impl Into<String>) {
        self.lock().queue.push_back(MockReply::Text(response.into()));
    }

    /// Queue a failure consumed by the next call, ahead of any rule
    pub fn push_error(&self, error: LlmError) {
        self.lock().queue.push_back(MockReply::Fail(error));
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    /// Reset the call history
    pub fn reset_call_count(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

impl CompletionProvider for MockProvider {
    type Error = LlmError;

    fn complete(&self, request: &CompletionRequest) -> Result<String, Self::Error> {
        let reply = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            match state.queue.pop_front() {
                Some(reply) => reply,
                None => state
                    .rules
                    .iter()
                    .find(|(key, _)| {
                        request.user_prompt.contains(key.as_str())
                            || request.system_prompt.contains(key.as_str())
                    })
                    .map(|(_, reply)| reply.clone())
                    .unwrap_or_else(|| MockReply::Text(self.default_response.clone())),
            }
        };

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> CompletionRequest {
        CompletionRequest::new("system", user)
    }

    #[test]
    fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.complete(&request("any prompt"));
        assert_eq!(result.unwrap(), "Test response");
    }

    #[test]
    fn test_mock_provider_substring_rules() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.complete(&request("say hello")).unwrap(), "world");
        assert_eq!(provider.complete(&request("foo!")).unwrap(), "bar");
        assert_eq!(provider.complete(&request("unknown")).unwrap(), "{}");
    }

    #[test]
    fn test_mock_provider_queue_takes_precedence() {
        let provider = MockProvider::new("default");
        provider.add_response("x", "rule");
        provider.push_response("first");
        provider.push_error(LlmError::Timeout(10));

        assert_eq!(provider.complete(&request("x")).unwrap(), "first");
        assert_eq!(
            provider.complete(&request("x")).unwrap_err(),
            LlmError::Timeout(10)
        );
        assert_eq!(provider.complete(&request("x")).unwrap(), "rule");
    }

    #[test]
    fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");
        assert_eq!(provider.call_count(), 0);

        provider.complete(&request("prompt1")).unwrap();
        provider.complete(&request("prompt2")).unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.requests()[1].user_prompt, "prompt2");

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_mock_provider_error() {
        let provider = MockProvider::default();
        provider.add_error("bad prompt", LlmError::Other("Mock error".into()));

        let result = provider.complete(&request("a bad prompt"));
        assert!(matches!(result.unwrap_err(), LlmError::Other(_)));
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.complete(&request("test")).unwrap();
        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[test]
    fn test_unavailable_mock() {
        assert!(!MockProvider::unavailable().is_available());
        assert!(MockProvider::default().is_available());
    }

    #[test]
    fn test_transient_errors() {
        assert!(LlmError::Timeout(5).is_transient());
        assert!(!LlmError::UnparsableResponse("x".into()).is_transient());
    }
}
