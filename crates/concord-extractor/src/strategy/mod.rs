//! Extraction strategies
//!
//! A strategy turns document text into a partial field set with its own
//! completeness and confidence. Strategies never fail past their boundary:
//! internal errors become a result with empty fields and a warning.

mod converted;
mod model_only;
mod pattern;
mod rag;

pub use converted::ConvertedStrategy;
pub use model_only::ModelOnlyStrategy;
pub use pattern::PatternStrategy;
pub use rag::RagStrategy;

use crate::chunking::Chunker;
use crate::error::ExtractorError;
use async_trait::async_trait;
use concord_domain::traits::CompletionRequest;
use concord_domain::{Chunk, FieldMap, StrategyResult, TopicDefinition, TopicRegistry};
use concord_gatekeeper::AbortSignal;
use concord_llm::ModelService;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Strategy names as registered with the manager
pub mod names {
    /// Regular expressions and pipe tables
    pub const PATTERN: &str = "pattern";
    /// Converted document plus per-topic model calls
    pub const CONVERTED: &str = "converted";
    /// Retrieval-augmented pattern matching
    pub const RAG: &str = "rag";
    /// Whole-document model calls
    pub const MODEL_ONLY: &str = "model_only";
}

/// Per-run options shared by every strategy
#[derive(Debug, Clone, Default)]
pub struct StrategyOptions {
    /// Topics to extract; all registered topics when absent
    pub topics: Option<Vec<String>>,
    /// Original file, for strategies that convert documents themselves
    pub file_path: Option<PathBuf>,
    /// Chunks of the text, when the caller already chunked it
    pub chunks: Option<Arc<Vec<Chunk>>>,
    /// Skip topics that do not fit the classified contract type
    pub narrow_by_contract_type: bool,
    /// Cancellation signal
    pub abort: Option<AbortSignal>,
}

impl StrategyOptions {
    /// True once cancellation was requested
    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().map(AbortSignal::is_aborted).unwrap_or(false)
    }
}

/// One independent method of turning document text into field values
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique strategy name
    fn name(&self) -> &str;

    /// Cheap probe without side effects
    fn is_available(&self) -> bool;

    /// Static rank, used only to break ties
    fn priority(&self) -> u32;

    /// Extract fields from `text`; never fails
    async fn parse(&self, text: &str, options: &StrategyOptions) -> StrategyResult;
}

/// The registered topics selected by `options`, in registry order
///
/// Unknown names are ignored.
pub(crate) fn selected_topics<'a>(
    registry: &'a TopicRegistry,
    options: &StrategyOptions,
) -> Vec<&'a TopicDefinition> {
    match &options.topics {
        Some(names) => registry
            .topics()
            .iter()
            .filter(|t| names.iter().any(|n| *n == t.name))
            .collect(),
        None => registry.topics().iter().collect(),
    }
}

/// Chunks passed in by the caller, or a fresh chunking pass
pub(crate) fn chunks_for(chunker: &Chunker, text: &str, options: &StrategyOptions) -> Arc<Vec<Chunk>> {
    match &options.chunks {
        Some(chunks) => Arc::clone(chunks),
        None => Arc::new(chunker.chunk(text)),
    }
}

/// Keep only the fields belonging to `topics`
pub(crate) fn restrict_to_topics(fields: FieldMap, topics: &[&TopicDefinition]) -> FieldMap {
    fields
        .into_iter()
        .filter(|(name, _)| topics.iter().any(|t| t.field(name).is_some()))
        .collect()
}

/// Assemble a result scored against the attempted topics
pub(crate) fn finish(
    name: &str,
    registry: &TopicRegistry,
    fields: FieldMap,
    topics: &[&TopicDefinition],
    confidence: f64,
    warnings: Vec<String>,
    started: Instant,
) -> StrategyResult {
    let topic_names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();
    let completeness = registry.completeness_for(&fields, &topic_names).score as f64;
    StrategyResult::new(name, fields, completeness, confidence)
        .with_warnings(warnings)
        .with_topics(topic_names)
        .with_duration_ms(started.elapsed().as_millis() as u64)
}

/// Call the model for JSON, giving up early when the run is aborted
pub(crate) async fn ask_model(
    model: &dyn ModelService,
    request: CompletionRequest,
    abort: Option<&AbortSignal>,
) -> Result<Value, ExtractorError> {
    match abort {
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.aborted() => Err(ExtractorError::Timeout("aborted".to_string())),
                result = model.complete_json(request) => result.map_err(ExtractorError::from),
            }
        }
        None => model.complete_json(request).await.map_err(ExtractorError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_topics_keep_registry_order() {
        let registry = TopicRegistry::contract_defaults();
        let options = StrategyOptions {
            topics: Some(vec!["milestones".into(), "basic_info".into(), "bogus".into()]),
            ..Default::default()
        };
        let names: Vec<&str> = selected_topics(&registry, &options)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["basic_info", "milestones"]);
        assert_eq!(selected_topics(&registry, &StrategyOptions::default()).len(), 7);
    }

    #[test]
    fn test_restrict_to_topics() {
        let registry = TopicRegistry::contract_defaults();
        let financial = registry.get("financial").unwrap();
        let mut fields = FieldMap::new();
        fields.insert("taxRate".into(), serde_json::json!("0.06"));
        fields.insert("contractNo".into(), serde_json::json!("CT-1"));
        let kept = restrict_to_topics(fields, &[financial]);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("taxRate"));
    }

    #[test]
    fn test_options_abort_flag() {
        let (handle, signal) = AbortSignal::new();
        let options = StrategyOptions {
            abort: Some(signal),
            ..Default::default()
        };
        assert!(!options.is_aborted());
        handle.abort();
        assert!(options.is_aborted());
    }
}
