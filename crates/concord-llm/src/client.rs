//! Async model access
//!
//! `CompletionProvider` is synchronous and carries its own error type, so it
//! cannot be shared as a trait object across tasks. [`ModelService`] is the
//! object-safe async surface; [`ModelClient`] implements it for any provider
//! by running the call on the blocking pool under `tokio::time::timeout`.

use crate::response::extract_json;
use crate::LlmError;
use async_trait::async_trait;
use concord_domain::traits::{CompletionProvider, CompletionRequest};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Async, object-safe access to a completion backend
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Run a completion and return the raw text
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Run a completion and recover a JSON value from the output
    async fn complete_json(&self, request: CompletionRequest) -> Result<Value, LlmError> {
        let text = self.complete_text(request).await?;
        extract_json(&text)
    }

    /// Name of the model answering requests
    fn model_name(&self) -> &str;

    /// Cheap capability probe
    fn is_available(&self) -> bool;
}

/// Adapter from a synchronous provider to [`ModelService`]
pub struct ModelClient<P> {
    provider: Arc<P>,
}

impl<P> ModelClient<P> {
    /// Wrap a provider
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Wrap a provider that is already shared
    pub fn from_arc(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Access the wrapped provider
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> Clone for ModelClient<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

#[async_trait]
impl<P> ModelService for ModelClient<P>
where
    P: CompletionProvider<Error = LlmError> + Send + Sync + 'static,
{
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let provider = Arc::clone(&self.provider);
        let timeout_ms = request.timeout_ms;
        let prompt_chars = request.system_prompt.len() + request.user_prompt.len();
        let started = Instant::now();

        // Call in a blocking context since CompletionProvider is not async
        let handle = tokio::task::spawn_blocking(move || provider.complete(&request));

        let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(joined) => {
                joined.map_err(|e| LlmError::Other(format!("Task join error: {}", e)))?
            }
            Err(_) => Err(LlmError::Timeout(timeout_ms)),
        };

        debug!(
            model = self.provider.model_name(),
            prompt_chars,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Model call finished"
        );
        result
    }

    fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_json_through_fences() {
        let client = ModelClient::new(MockProvider::new("```json\n{\"a\": 1}\n```"));
        let value = client
            .complete_json(CompletionRequest::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let client =
            ModelClient::new(MockProvider::new("{}").with_delay(Duration::from_millis(300)));
        let request = CompletionRequest::new("s", "u").with_timeout_ms(20);
        let result = client.complete_text(request).await;
        assert_eq!(result.unwrap_err(), LlmError::Timeout(20));
    }

    #[tokio::test]
    async fn test_provider_errors_pass_through() {
        let provider = MockProvider::default();
        provider.push_error(LlmError::ModelNotAvailable("qwen".into()));
        let client = ModelClient::new(provider);
        let result = client.complete_text(CompletionRequest::new("s", "u")).await;
        assert_eq!(result.unwrap_err(), LlmError::ModelNotAvailable("qwen".into()));
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let service: Arc<dyn ModelService> = Arc::new(ModelClient::new(MockProvider::new("[]")));
        assert_eq!(service.model_name(), "mock");
        assert!(service.is_available());
        let value = service
            .complete_json(CompletionRequest::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }
}
