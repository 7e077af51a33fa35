//! Model-only strategy: the whole document, one model call per topic

use super::{ask_model, finish, names, selected_topics, Strategy, StrategyOptions};
use crate::config::ExtractorConfig;
use crate::parser::{parse_contract_type, parse_topic_fields};
use crate::prompt::{classification_request, PromptBuilder};
use crate::types::ContractType;
use async_trait::async_trait;
use concord_domain::{FieldMap, StrategyResult, TopicDefinition, TopicRegistry};
use concord_llm::ModelService;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const BASE_CONFIDENCE: f64 = 75.0;

/// Sends the (truncated) document to the model once per topic, after an
/// optional contract-type classification
pub struct ModelOnlyStrategy {
    model: Arc<dyn ModelService>,
    registry: Arc<TopicRegistry>,
    config: ExtractorConfig,
}

impl ModelOnlyStrategy {
    /// Create the strategy
    pub fn new(
        model: Arc<dyn ModelService>,
        registry: Arc<TopicRegistry>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            model,
            registry,
            config,
        }
    }

    async fn classify(&self, context: &str, options: &StrategyOptions) -> Result<ContractType, String> {
        let request = classification_request(context).with_timeout_ms(self.config.model_timeout_ms());
        let answer = ask_model(self.model.as_ref(), request, options.abort.as_ref())
            .await
            .map_err(|e| format!("classification: {}", e))?;
        parse_contract_type(&answer)
            .ok_or_else(|| "classification: no recognizable contract type".to_string())
    }

    async fn ask(
        &self,
        topic: &TopicDefinition,
        context: &str,
        options: &StrategyOptions,
    ) -> Result<FieldMap, String> {
        let request = PromptBuilder::new(vec![topic], context)
            .build()
            .with_timeout_ms(self.config.model_timeout_ms());
        match ask_model(self.model.as_ref(), request, options.abort.as_ref()).await {
            Ok(value) => Ok(parse_topic_fields(&value, &[topic])),
            Err(e) => {
                warn!(topic = %topic.name, error = %e, "Topic call failed");
                Err(format!("{}: {}", topic.name, e))
            }
        }
    }
}

#[async_trait]
impl Strategy for ModelOnlyStrategy {
    fn name(&self) -> &str {
        names::MODEL_ONLY
    }

    fn is_available(&self) -> bool {
        self.model.is_available()
    }

    fn priority(&self) -> u32 {
        40
    }

    async fn parse(&self, text: &str, options: &StrategyOptions) -> StrategyResult {
        let started = Instant::now();
        if text.trim().is_empty() {
            return StrategyResult::failed(self.name(), "document is empty");
        }

        let context: String = text.chars().take(self.config.max_context_chars).collect();
        let mut warnings = Vec::new();
        let mut selected = selected_topics(&self.registry, options);

        // An explicit topic list skips classification
        let contract_type = if options.topics.is_none() {
            match self.classify(&context, options).await {
                Ok(contract_type) => {
                    info!(contract_type = contract_type.as_str(), "Classified contract");
                    Some(contract_type)
                }
                Err(message) => {
                    warn!(%message, "Classification failed");
                    warnings.push(message);
                    None
                }
            }
        } else {
            None
        };

        if let (true, Some(contract_type)) = (options.narrow_by_contract_type, contract_type) {
            let skipped = contract_type.skipped_topics();
            selected.retain(|t| !skipped.contains(&t.name.as_str()));
            debug!(skipped = ?skipped, "Narrowed topics by contract type");
        }

        let total_calls = selected.len();
        let pending: Vec<_> = selected
            .iter()
            .copied()
            .map(|topic| self.ask(topic, &context, options))
            .collect();
        let answers: Vec<Result<FieldMap, String>> = stream::iter(pending)
            .buffered(self.config.topic_concurrency.max(1))
            .collect()
            .await;

        let mut fields = FieldMap::new();
        let mut succeeded = 0;
        for answer in answers {
            match answer {
                Ok(found) => {
                    succeeded += 1;
                    for (name, value) in found {
                        fields.entry(name).or_insert(value);
                    }
                }
                Err(message) => warnings.push(message),
            }
        }

        if let Some(contract_type) = contract_type {
            if selected.iter().any(|t| t.field("contractType").is_some()) {
                fields.insert(
                    "contractType".to_string(),
                    Value::String(contract_type.as_str().to_string()),
                );
            }
        }

        let confidence = if total_calls == 0 {
            0.0
        } else {
            BASE_CONFIDENCE * succeeded as f64 / total_calls as f64
        };

        finish(
            self.name(),
            &self.registry,
            fields,
            &selected,
            confidence,
            warnings,
            started,
        )
    }
}
