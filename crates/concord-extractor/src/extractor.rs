//! Extraction orchestrator

use crate::chunking::Chunker;
use crate::config::ExtractorConfig;
use crate::converter::{ConverterClient, SharedConverter};
use crate::error::ExtractorError;
use crate::manager::StrategyManager;
use crate::strategy::{
    ConvertedStrategy, ModelOnlyStrategy, PatternStrategy, RagStrategy, StrategyOptions,
};
use crate::types::{ContractType, ExtractionOutcome, ExtractionRequest};
use crate::voting::VotingEngine;
use concord_domain::value::is_filled;
use concord_domain::{Chunk, ExtractionId, FieldMap, TopicDefinition, TopicRegistry, ValidationResult, VoteResult};
use concord_gatekeeper::{Gatekeeper, RetryLoop};
use concord_llm::ModelService;
use concord_retrieval::NgramEmbeddingModel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs strategies over a document and reconciles their answers
///
/// One `extract` call chunks the text once, runs the requested strategies
/// through the [`StrategyManager`], votes field by field, optionally settles
/// conflicts, then validates (and optionally corrects) each topic.
pub struct Extractor {
    config: ExtractorConfig,
    registry: Arc<TopicRegistry>,
    chunker: Chunker,
    manager: StrategyManager,
    voting: VotingEngine,
    gatekeeper: Arc<Gatekeeper>,
    retry: Option<RetryLoop>,
}

impl Extractor {
    /// Build an extractor with the standard strategies
    ///
    /// Pattern and retrieval strategies are always registered; the
    /// converted-document and model-only strategies need a model.
    pub fn new(
        config: ExtractorConfig,
        model: Option<Arc<dyn ModelService>>,
        converter: Option<SharedConverter>,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        let registry = Arc::new(TopicRegistry::contract_defaults());

        let mut manager = StrategyManager::new(config.strategy_timeout())
            .with_max_concurrency(config.max_concurrency);
        manager.register(Arc::new(PatternStrategy::new(Arc::clone(&registry))));
        manager.register(Arc::new(RagStrategy::new(
            Arc::new(NgramEmbeddingModel::new(config.rag.embedding_dimension)),
            Arc::clone(&registry),
            config.clone(),
        )));

        if let Some(model) = &model {
            let converter = converter.map(|c| ConverterClient::new(c, config.strategy_timeout()));
            manager.register(Arc::new(ConvertedStrategy::new(
                Arc::clone(model),
                converter,
                Arc::clone(&registry),
                config.clone(),
            )));
            manager.register(Arc::new(ModelOnlyStrategy::new(
                Arc::clone(model),
                Arc::clone(&registry),
                config.clone(),
            )));
        } else if converter.is_some() {
            warn!("Converter configured without a model, converted strategy disabled");
        }

        Self::from_parts(config, registry, manager, model)
    }

    /// Build an extractor around an already populated manager
    pub fn from_parts(
        config: ExtractorConfig,
        registry: Arc<TopicRegistry>,
        manager: StrategyManager,
        model: Option<Arc<dyn ModelService>>,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        let gatekeeper = Arc::new(Gatekeeper::with_registry(
            config.validation.clone(),
            Arc::clone(&registry),
        ));

        let mut voting = VotingEngine::new(config.voting.clone())
            .with_priorities(manager.priorities())
            .with_registry(Arc::clone(&registry));
        let retry = match &model {
            Some(model) => {
                voting = voting.with_model(
                    Arc::clone(model),
                    config.resolution_excerpt_chars,
                    config.model_timeout_ms(),
                );
                let retry = RetryLoop::new(Arc::clone(model), Arc::clone(&gatekeeper), config.retry.clone())
                    .map_err(|e| ExtractorError::Config(e.to_string()))?;
                Some(retry)
            }
            None => None,
        };

        info!(
            strategies = ?manager.names(),
            topics = registry.len(),
            model = model.as_ref().map(|m| m.model_name()).unwrap_or("none"),
            "Extractor ready"
        );

        Ok(Self {
            chunker: Chunker::new(config.chunker.clone()),
            config,
            registry,
            manager,
            voting,
            gatekeeper,
            retry,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Get the topic registry
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Get the strategy manager
    pub fn manager(&self) -> &StrategyManager {
        &self.manager
    }

    /// Chunk text with the configured chunker
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.chunker.chunk(text)
    }

    /// Extract contract fields from the request text
    ///
    /// Strategy failures, conflicts and validation problems never fail the
    /// call; they show up in the outcome's warnings and scores.
    ///
    /// # Errors
    ///
    /// `TextTooLong` when the text exceeds `max_text_length` characters.
    pub async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutcome, ExtractorError> {
        let started = Instant::now();
        let length = request.text.chars().count();
        if length > self.config.max_text_length {
            return Err(ExtractorError::TextTooLong(length, self.config.max_text_length));
        }

        let id = ExtractionId::new();
        let mut warnings = Vec::new();
        info!(%id, chars = length, "Starting extraction");

        if let Some(topics) = &request.topics {
            for topic in topics.iter().filter(|t| self.registry.get_safe(t).is_none()) {
                warn!(%id, topic = %topic, "Unknown topic ignored");
                warnings.push(format!("unknown topic: {}", topic));
            }
        }

        let chunks = Arc::new(self.chunker.chunk(&request.text));
        debug!(%id, chunks = chunks.len(), "Chunked document");

        let options = StrategyOptions {
            topics: request.topics.clone(),
            file_path: request.file_path.clone(),
            chunks: Some(chunks),
            narrow_by_contract_type: request
                .narrow_by_contract_type
                .unwrap_or(self.config.narrow_by_contract_type),
            abort: request.abort.clone(),
        };

        let names = match &request.strategies {
            Some(names) => names.clone(),
            None => self
                .manager
                .available()
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
        };
        let report = self
            .manager
            .run_many_detailed(&names, &request.text, &options)
            .await;

        for skipped in &report.skipped {
            warnings.push(format!("strategy {} skipped: {}", skipped.strategy, skipped.reason));
        }
        for result in &report.results {
            warnings.extend(
                result
                    .warnings
                    .iter()
                    .map(|w| format!("{}: {}", result.strategy_name, w)),
            );
        }
        if report.results.is_empty() {
            warn!(%id, "No strategy produced a result");
        }

        let mut votes = self.voting.vote(&report.results);
        if let Some(resolution) = &request.resolution {
            votes = self
                .voting
                .resolve_conflicts(votes, &request.text, resolution)
                .await;
        }
        for vote in votes.iter().filter(|v| v.needs_resolution && !v.votes.is_empty()) {
            debug!(%id, field = %vote.field_name, confidence = vote.confidence, "Field needs resolution");
            warnings.push(format!(
                "{} needs resolution (confidence {:.2})",
                vote.field_name, vote.confidence
            ));
        }

        let mut fields: FieldMap = votes
            .iter()
            .filter(|v| is_filled(&v.agreed_value))
            .map(|v| (v.field_name.clone(), v.agreed_value.clone()))
            .collect();

        let topics = self.requested_topics(&request);
        let (validation, aborted) = self
            .validate(&request, &topics, &mut fields, &mut warnings)
            .await;

        let completeness = match &request.topics {
            Some(names) => self.registry.completeness_for(&fields, names),
            None => self.registry.completeness_of(&fields),
        };
        let confidence = overall_confidence(&votes, &validation);
        let contract_type = fields
            .get("contractType")
            .and_then(|v| v.as_str())
            .and_then(ContractType::parse);
        let aborted = aborted || request.abort.as_ref().map(|a| a.is_aborted()).unwrap_or(false);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            %id,
            strategies = report.results.len(),
            fields = fields.len(),
            completeness = completeness.score,
            confidence,
            conflicts = votes.iter().filter(|v| v.needs_resolution && !v.votes.is_empty()).count(),
            aborted,
            duration_ms,
            "Extraction complete"
        );

        Ok(ExtractionOutcome {
            id,
            fields,
            completeness,
            confidence,
            per_field_votes: votes,
            warnings,
            strategies: report.results,
            validation,
            contract_type,
            aborted,
            duration_ms,
        })
    }

    fn requested_topics(&self, request: &ExtractionRequest) -> Vec<&TopicDefinition> {
        match &request.topics {
            Some(names) => self
                .registry
                .topics()
                .iter()
                .filter(|t| names.contains(&t.name))
                .collect(),
            None => self.registry.topics().iter().collect(),
        }
    }

    /// Validate each topic that has a value, correcting through the model
    /// when the request asks for it
    ///
    /// With correction enabled, empty topics are sent to the model too.
    async fn validate(
        &self,
        request: &ExtractionRequest,
        topics: &[&TopicDefinition],
        fields: &mut FieldMap,
        warnings: &mut Vec<String>,
    ) -> (BTreeMap<String, ValidationResult>, bool) {
        let retry = match (&self.retry, request.enable_validation_retry) {
            (Some(retry), true) => Some(retry),
            (None, true) => {
                warnings.push("validation retry requested without a model".to_string());
                None
            }
            _ => None,
        };

        let mut results = BTreeMap::new();
        let mut aborted = false;
        for topic in topics {
            let correcting = retry.filter(|_| !aborted);
            if correcting.is_none() && topic.completed_fields(fields) == 0 {
                continue;
            }
            let validation = match correcting {
                Some(retry) => {
                    let outcome = retry
                        .validate_with_retry(
                            topic.select(fields),
                            &request.text,
                            &topic.name,
                            request.abort.as_ref(),
                        )
                        .await;
                    if outcome.attempts > 0 {
                        info!(topic = %topic.name, attempts = outcome.attempts, score = outcome.validation.score, "Corrected topic");
                    }
                    aborted |= outcome.aborted;
                    replace_topic_fields(fields, topic, outcome.fields);
                    outcome.validation
                }
                _ => self.gatekeeper.validate(fields, &topic.name, Some(&request.text)),
            };

            warnings.extend(
                validation
                    .errors
                    .iter()
                    .map(|issue| format!("{} invalid: {}", topic.name, issue)),
            );
            warnings.extend(
                validation
                    .warnings
                    .iter()
                    .map(|issue| format!("{} warning: {}", topic.name, issue)),
            );
            results.insert(topic.name.clone(), validation);
        }
        (results, aborted)
    }
}

fn replace_topic_fields(fields: &mut FieldMap, topic: &TopicDefinition, corrected: FieldMap) {
    fields.retain(|name, _| topic.field(name).is_none());
    fields.extend(
        corrected
            .into_iter()
            .filter(|(name, value)| topic.field(name).is_some() && is_filled(value)),
    );
}

/// Mean winning share of the decided fields, scaled by the mean validation score
fn overall_confidence(votes: &[VoteResult], validation: &BTreeMap<String, ValidationResult>) -> f64 {
    let decided: Vec<f64> = votes
        .iter()
        .filter(|v| is_filled(&v.agreed_value))
        .map(|v| v.confidence)
        .collect();
    if decided.is_empty() {
        return 0.0;
    }
    let agreement = decided.iter().sum::<f64>() / decided.len() as f64 * 100.0;

    let quality = if validation.is_empty() {
        1.0
    } else {
        validation.values().map(|v| v.score as f64).sum::<f64>() / validation.len() as f64 / 100.0
    };
    (agreement * quality).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_domain::{ResolutionMethod, Vote};
    use serde_json::json;

    fn vote(field: &str, value: serde_json::Value, confidence: f64) -> VoteResult {
        VoteResult {
            field_name: field.to_string(),
            votes: vec![Vote {
                strategy_name: "pattern".into(),
                value: value.clone(),
                weight: 1.0,
            }],
            agreed_value: value,
            confidence,
            needs_resolution: false,
            resolution_method: ResolutionMethod::Vote,
        }
    }

    #[test]
    fn test_overall_confidence() {
        let votes = vec![
            vote("contractNo", json!("CT-1"), 1.0),
            vote("taxRate", json!("0.06"), 0.5),
            vote("signDate", serde_json::Value::Null, 0.0),
        ];
        assert_eq!(overall_confidence(&votes, &BTreeMap::new()), 75.0);

        let mut validation = BTreeMap::new();
        validation.insert("basic_info".to_string(), ValidationResult::clean());
        validation.insert(
            "financial".to_string(),
            ValidationResult::from_issues(vec![concord_domain::ValidationIssue::new("taxRate", "bad")], vec![]),
        );
        // mean score (100 + 80) / 2 = 90
        assert!((overall_confidence(&votes, &validation) - 67.5).abs() < 1e-9);
        assert_eq!(overall_confidence(&[], &validation), 0.0);
    }

    #[test]
    fn test_replace_topic_fields_keeps_other_topics() {
        let registry = TopicRegistry::contract_defaults();
        let financial = registry.get("financial").unwrap();
        let mut fields = FieldMap::new();
        fields.insert("contractNo".into(), json!("CT-1"));
        fields.insert("taxRate".into(), json!("6%"));
        fields.insert("currency".into(), json!("CNY"));

        let mut corrected = FieldMap::new();
        corrected.insert("taxRate".into(), json!("0.06"));
        corrected.insert("contractNo".into(), json!("WRONG"));
        corrected.insert("currency".into(), json!("N/A"));
        replace_topic_fields(&mut fields, financial, corrected);

        assert_eq!(fields["taxRate"], json!("0.06"));
        assert_eq!(fields["contractNo"], json!("CT-1"));
        assert!(!fields.contains_key("currency"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ExtractorConfig::default();
        config.max_concurrency = 0;
        let err = Extractor::new(config, None, None).err().unwrap();
        assert!(matches!(err, ExtractorError::Config(_)));
    }
}
