//! Weighted voting across strategy results
//!
//! Each field is decided independently: every enabled strategy with a filled
//! value casts one vote carrying its configured weight, equal values pool
//! their weight, and the heaviest group wins. A field whose winning share
//! falls below the threshold is flagged for resolution by a user choice or
//! by the model.

use crate::parser::parse_resolution;
use crate::prompt::conflict_request;
use crate::strategy::names;
use crate::types::Resolution;
use concord_domain::{is_filled, ResolutionMethod, StrategyResult, TopicRegistry, Vote, VoteResult};
use concord_llm::ModelService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Confidence given to a model resolution that reports none
const DEFAULT_LLM_CONFIDENCE: f64 = 0.8;

/// Voting settings for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeight {
    /// Disabled strategies do not vote
    pub enabled: bool,

    /// Weight of each vote cast by the strategy
    pub weight: f64,
}

impl Default for StrategyWeight {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
        }
    }
}

impl StrategyWeight {
    fn weighted(weight: f64) -> Self {
        Self {
            enabled: true,
            weight,
        }
    }
}

/// Voting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Fields whose winning share is below this need resolution
    pub threshold: f64,

    /// Weight of strategies missing from `strategies`
    pub default_weight: f64,

    /// Merge near-identical string values at or above this similarity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_merge: Option<f64>,

    /// Per-strategy settings by strategy name
    pub strategies: BTreeMap<String, StrategyWeight>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        let strategies = [
            (names::PATTERN, 1.0),
            (names::CONVERTED, 1.0),
            (names::RAG, 0.8),
            (names::MODEL_ONLY, 0.9),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), StrategyWeight::weighted(weight)))
        .collect();

        Self {
            threshold: 0.6,
            default_weight: 1.0,
            similarity_merge: None,
            strategies,
        }
    }
}

impl VotingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err("voting.threshold must be in (0, 1)".to_string());
        }
        if self.default_weight < 0.0 {
            return Err("voting.default_weight must not be negative".to_string());
        }
        if let Some(merge) = self.similarity_merge {
            if !(merge > 0.0 && merge <= 1.0) {
                return Err("voting.similarity_merge must be in (0, 1]".to_string());
            }
        }
        if let Some((name, _)) = self.strategies.iter().find(|(_, s)| s.weight < 0.0) {
            return Err(format!("voting.strategies.{}.weight must not be negative", name));
        }
        Ok(())
    }

    /// Vote weight of a strategy, `None` when it is disabled
    pub fn weight_of(&self, strategy: &str) -> Option<f64> {
        match self.strategies.get(strategy) {
            Some(s) if !s.enabled => None,
            Some(s) => Some(s.weight),
            None => Some(self.default_weight),
        }
    }
}

/// Votes pooled behind one value
#[derive(Debug)]
struct Group {
    value: Value,
    weight: f64,
    priority: u32,
    first_seen: usize,
}

/// Decides each field by weighted vote and settles conflicts
pub struct VotingEngine {
    config: VotingConfig,
    priorities: BTreeMap<String, u32>,
    model: Option<Arc<dyn ModelService>>,
    excerpt_chars: usize,
    timeout_ms: u64,
    registry: Option<Arc<TopicRegistry>>,
}

impl VotingEngine {
    /// Create an engine without a model; ties fall back to input order
    pub fn new(config: VotingConfig) -> Self {
        Self {
            config,
            priorities: BTreeMap::new(),
            model: None,
            excerpt_chars: 2_000,
            timeout_ms: 60_000,
            registry: None,
        }
    }

    /// Static strategy priorities used to break ties
    pub fn with_priorities(mut self, priorities: BTreeMap<String, u32>) -> Self {
        self.priorities = priorities;
        self
    }

    /// Model used for `Resolution::Llm`
    pub fn with_model(mut self, model: Arc<dyn ModelService>, excerpt_chars: usize, timeout_ms: u64) -> Self {
        self.model = Some(model);
        self.excerpt_chars = excerpt_chars;
        self.timeout_ms = timeout_ms;
        self
    }

    /// Registry used to describe fields in resolution prompts
    pub fn with_registry(mut self, registry: Arc<TopicRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Get the voting configuration
    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Vote on every field any strategy produced, in field-name order
    pub fn vote(&self, results: &[StrategyResult]) -> Vec<VoteResult> {
        let field_names: BTreeSet<&String> = results.iter().flat_map(|r| r.fields.keys()).collect();

        field_names
            .into_iter()
            .map(|field| self.vote_field(field, results))
            .collect()
    }

    fn vote_field(&self, field: &str, results: &[StrategyResult]) -> VoteResult {
        let votes: Vec<Vote> = results
            .iter()
            .filter_map(|result| {
                let weight = self.config.weight_of(&result.strategy_name)?;
                let value = result.fields.get(field).filter(|v| is_filled(v))?;
                Some(Vote {
                    strategy_name: result.strategy_name.clone(),
                    value: value.clone(),
                    weight,
                })
            })
            .collect();

        let total: f64 = votes.iter().map(|v| v.weight).sum();
        let winner = self.winning_group(&votes);

        let (agreed_value, confidence) = match winner {
            Some(group) if total > 0.0 => (group.value, group.weight / total),
            Some(group) => (group.value, 0.0),
            None => (Value::Null, 0.0),
        };

        VoteResult {
            field_name: field.to_string(),
            votes,
            agreed_value,
            confidence,
            needs_resolution: confidence < self.config.threshold,
            resolution_method: ResolutionMethod::Vote,
        }
    }

    fn winning_group(&self, votes: &[Vote]) -> Option<Group> {
        let mut groups: Vec<Group> = Vec::new();
        for (i, vote) in votes.iter().enumerate() {
            let priority = self.priorities.get(&vote.strategy_name).copied().unwrap_or(0);
            match groups.iter_mut().find(|g| g.value == vote.value) {
                Some(group) => {
                    group.weight += vote.weight;
                    group.priority = group.priority.max(priority);
                }
                None => groups.push(Group {
                    value: vote.value.clone(),
                    weight: vote.weight,
                    priority,
                    first_seen: i,
                }),
            }
        }

        if let Some(threshold) = self.config.similarity_merge {
            groups = merge_similar(groups, threshold);
        }

        groups.into_iter().reduce(|best, group| {
            if beats(&group, &best) {
                group
            } else {
                best
            }
        })
    }

    /// Settle flagged fields; fields that cannot be settled come back unchanged
    ///
    /// `Resolution::User` applies to every field it names, flagged or not.
    pub async fn resolve_conflicts(
        &self,
        votes: Vec<VoteResult>,
        text: &str,
        resolution: &Resolution,
    ) -> Vec<VoteResult> {
        match resolution {
            Resolution::User(choices) => votes
                .into_iter()
                .map(|mut vote| {
                    if let Some(choice) = choices.get(&vote.field_name) {
                        debug!(field = %vote.field_name, "Applied user choice");
                        vote.agreed_value = choice.clone();
                        vote.confidence = 1.0;
                        vote.needs_resolution = false;
                        vote.resolution_method = ResolutionMethod::User;
                    }
                    vote
                })
                .collect(),
            Resolution::Llm => {
                let Some(model) = &self.model else {
                    warn!("Model resolution requested without a model");
                    return votes;
                };
                let excerpt: String = text.chars().take(self.excerpt_chars).collect();
                let mut resolved = Vec::with_capacity(votes.len());
                for vote in votes {
                    resolved.push(self.resolve_with_model(model.as_ref(), vote, &excerpt).await);
                }
                resolved
            }
        }
    }

    async fn resolve_with_model(&self, model: &dyn ModelService, mut vote: VoteResult, excerpt: &str) -> VoteResult {
        if !vote.needs_resolution || vote.votes.is_empty() {
            return vote;
        }

        let description = self
            .registry
            .as_ref()
            .and_then(|r| r.topic_of_field(&vote.field_name))
            .and_then(|t| t.field(&vote.field_name))
            .map(|f| f.description.clone());
        let candidates = vote.candidates();
        let request = conflict_request(&vote.field_name, description.as_deref(), &candidates, excerpt)
            .with_timeout_ms(self.timeout_ms);

        let answer = match model.complete_json(request).await {
            Ok(value) => parse_resolution(&value, &candidates),
            Err(e) => {
                warn!(field = %vote.field_name, error = %e, "Model resolution failed");
                return vote;
            }
        };

        match answer {
            Some(answer) => {
                let reported = answer.confidence.unwrap_or(DEFAULT_LLM_CONFIDENCE);
                info!(field = %vote.field_name, "Resolved conflict with model");
                vote.agreed_value = answer.value;
                vote.confidence = vote.confidence.max(reported);
                vote.needs_resolution = false;
                vote.resolution_method = ResolutionMethod::Llm;
                vote
            }
            None => {
                warn!(field = %vote.field_name, "Model resolution had no usable value");
                vote
            }
        }
    }
}

/// Heavier wins; equal weights go to higher priority, then to the earlier group
fn beats(challenger: &Group, incumbent: &Group) -> bool {
    const EPSILON: f64 = 1e-9;
    if (challenger.weight - incumbent.weight).abs() > EPSILON {
        return challenger.weight > incumbent.weight;
    }
    if challenger.priority != incumbent.priority {
        return challenger.priority > incumbent.priority;
    }
    challenger.first_seen < incumbent.first_seen
}

/// Fold each group into the first heavier-or-equal group it resembles
fn merge_similar(mut groups: Vec<Group>, threshold: f64) -> Vec<Group> {
    groups.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    let mut merged: Vec<Group> = Vec::with_capacity(groups.len());
    for group in groups {
        match merged
            .iter_mut()
            .find(|m| similarity(&m.value, &group.value) >= threshold)
        {
            Some(target) => {
                target.weight += group.weight;
                target.priority = target.priority.max(group.priority);
                target.first_seen = target.first_seen.min(group.first_seen);
            }
            None => merged.push(group),
        }
    }
    merged
}

/// Similarity of two values in [0, 1]
///
/// Strings compare by normalized Levenshtein distance after lowercasing and
/// dropping whitespace; other values compare by equality.
///
/// # Examples
///
/// ```
/// use concord_extractor::voting::similarity;
/// use serde_json::json;
///
/// assert_eq!(similarity(&json!("Acme Ltd"), &json!("acmeltd")), 1.0);
/// assert_eq!(similarity(&json!(1), &json!("1")), 0.0);
/// ```
pub fn similarity(a: &Value, b: &Value) -> f64 {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            let a = normalize(a);
            let b = normalize(b);
            let longest = a.len().max(b.len());
            if longest == 0 {
                return 1.0;
            }
            1.0 - levenshtein(&a, &b) as f64 / longest as f64
        }
        _ => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn normalize(s: &str) -> Vec<char> {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_domain::FieldMap;
    use concord_llm::{MockProvider, ModelClient};
    use serde_json::json;

    fn result(name: &str, fields: &[(&str, Value)]) -> StrategyResult {
        let fields: FieldMap = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        StrategyResult::new(name, fields, 50.0, 50.0)
    }

    fn equal_weights() -> VotingConfig {
        VotingConfig {
            strategies: BTreeMap::new(),
            ..VotingConfig::default()
        }
    }

    fn field<'a>(votes: &'a [VoteResult], name: &str) -> &'a VoteResult {
        votes.iter().find(|v| v.field_name == name).unwrap()
    }

    #[test]
    fn test_unanimous_vote() {
        let results = vec![
            result("pattern", &[("contractNo", json!("CT-001"))]),
            result("converted", &[("contractNo", json!("CT-001"))]),
            result("rag", &[("contractNo", json!("CT-001"))]),
        ];
        let votes = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].agreed_value, json!("CT-001"));
        assert_eq!(votes[0].confidence, 1.0);
        assert!(!votes[0].needs_resolution);
        assert_eq!(votes[0].resolution_method, ResolutionMethod::Vote);
    }

    #[test]
    fn test_majority_wins() {
        let results = vec![
            result("a", &[("amountWithTax", json!("500000"))]),
            result("b", &[("amountWithTax", json!("500000"))]),
            result("c", &[("amountWithTax", json!("50000"))]),
        ];
        let votes = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(votes[0].agreed_value, json!("500000"));
        assert!((votes[0].confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!(!votes[0].needs_resolution);
        assert!(votes[0].is_contested());
    }

    #[test]
    fn test_split_vote_needs_resolution() {
        let results = vec![
            result("a", &[("contractNo", json!("X"))]),
            result("b", &[("contractNo", json!("Y"))]),
        ];
        let votes = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(votes[0].confidence, 0.5);
        assert!(votes[0].needs_resolution);
        assert_eq!(votes[0].agreed_value, json!("X"));
    }

    #[test]
    fn test_weighted_agreement_is_full_confidence() {
        let mut config = equal_weights();
        config.strategies.insert("a".into(), StrategyWeight::weighted(2.0));
        config.strategies.insert("b".into(), StrategyWeight::weighted(1.0));
        let results = vec![
            result("a", &[("contractNo", json!("X"))]),
            result("b", &[("contractNo", json!("X"))]),
        ];
        let votes = VotingEngine::new(config).vote(&results);
        assert_eq!(votes[0].confidence, 1.0);
        assert!(!votes[0].needs_resolution);
        assert_eq!(votes[0].votes.len(), 2);
    }

    #[test]
    fn test_unequal_default_weights_below_threshold() {
        let results = vec![
            result("pattern", &[("contractNo", json!("CT-001"))]),
            result("rag", &[("contractNo", json!("CT-009"))]),
        ];
        let votes = VotingEngine::new(VotingConfig::default()).vote(&results);
        assert_eq!(votes[0].agreed_value, json!("CT-001"));
        assert!((votes[0].confidence - 1.0 / 1.8).abs() < 1e-9);
        assert!(votes[0].needs_resolution);
    }

    #[test]
    fn test_placeholders_never_vote() {
        let results = vec![
            result("a", &[("signDate", json!("N/A"))]),
            result("b", &[("signDate", json!("  "))]),
        ];
        let votes = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(votes[0].agreed_value, Value::Null);
        assert_eq!(votes[0].confidence, 0.0);
        assert!(votes[0].needs_resolution);
        assert!(votes[0].votes.is_empty());
    }

    #[test]
    fn test_weights_and_disabled_strategies() {
        let mut config = VotingConfig::default();
        config.strategies.insert("pattern".into(), StrategyWeight::weighted(3.0));
        config.strategies.insert(
            "rag".into(),
            StrategyWeight {
                enabled: false,
                weight: 10.0,
            },
        );
        let results = vec![
            result("converted", &[("taxRate", json!("0.13"))]),
            result("pattern", &[("taxRate", json!("0.06"))]),
            result("rag", &[("taxRate", json!("0.13"))]),
        ];
        let votes = VotingEngine::new(config).vote(&results);
        assert_eq!(votes[0].agreed_value, json!("0.06"));
        assert_eq!(votes[0].confidence, 0.75);
        assert_eq!(votes[0].votes.len(), 2);
    }

    #[test]
    fn test_tie_goes_to_priority_then_order() {
        let results = vec![
            result("model_only", &[("name", json!("甲"))]),
            result("pattern", &[("name", json!("乙"))]),
        ];
        let priorities: BTreeMap<String, u32> =
            [("pattern".to_string(), 100), ("model_only".to_string(), 40)].into();

        let by_priority = VotingEngine::new(equal_weights())
            .with_priorities(priorities)
            .vote(&results);
        assert_eq!(by_priority[0].agreed_value, json!("乙"));

        let by_order = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(by_order[0].agreed_value, json!("甲"));
    }

    #[test]
    fn test_fields_are_sorted_and_unioned() {
        let results = vec![
            result("a", &[("taxRate", json!("0.06"))]),
            result("b", &[("contractNo", json!("CT-1"))]),
        ];
        let votes = VotingEngine::new(equal_weights()).vote(&results);
        let names: Vec<&str> = votes.iter().map(|v| v.field_name.as_str()).collect();
        assert_eq!(names, vec!["contractNo", "taxRate"]);
        assert!(votes.iter().all(|v| v.confidence == 1.0));
    }

    #[test]
    fn test_similarity_merge() {
        let results = vec![
            result("a", &[("customerName", json!("北京某某科技有限公司"))]),
            result("b", &[("customerName", json!("北京某某科技有限公司"))]),
            result("c", &[("customerName", json!("北京某某科技有限公司 "))]),
            result("d", &[("customerName", json!("上海另一家公司"))]),
        ];
        let plain = VotingEngine::new(equal_weights()).vote(&results);
        assert_eq!(plain[0].confidence, 0.5);

        let config = VotingConfig {
            similarity_merge: Some(0.9),
            ..equal_weights()
        };
        let merged = VotingEngine::new(config).vote(&results);
        assert_eq!(merged[0].agreed_value, json!("北京某某科技有限公司"));
        assert_eq!(merged[0].confidence, 0.75);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(&json!("abc"), &json!("abc")), 1.0);
        assert!((similarity(&json!("abcd"), &json!("abce")) - 0.75).abs() < 1e-9);
        assert_eq!(similarity(&json!(""), &json!(" ")), 1.0);
        assert_eq!(similarity(&json!([1]), &json!([1])), 1.0);
        assert_eq!(similarity(&json!(0.06), &json!(0.13)), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(VotingConfig::default().validate().is_ok());
        for threshold in [0.0, 1.0, -0.2] {
            let config = VotingConfig {
                threshold,
                ..VotingConfig::default()
            };
            assert!(config.validate().is_err());
        }
        let mut config = VotingConfig::default();
        config.strategies.insert("rag".into(), StrategyWeight::weighted(-1.0));
        assert!(config.validate().is_err());
    }

    fn split_votes() -> Vec<VoteResult> {
        let results = vec![
            result("a", &[("contractNo", json!("X")), ("taxRate", json!("0.06"))]),
            result("b", &[("contractNo", json!("Y")), ("taxRate", json!("0.06"))]),
        ];
        VotingEngine::new(equal_weights()).vote(&results)
    }

    #[tokio::test]
    async fn test_user_resolution() {
        let engine = VotingEngine::new(equal_weights());
        let choices: BTreeMap<String, Value> = [("contractNo".to_string(), json!("Z"))].into();

        let resolved = engine
            .resolve_conflicts(split_votes(), "text", &Resolution::User(choices))
            .await;
        let contract_no = field(&resolved, "contractNo");
        assert_eq!(contract_no.agreed_value, json!("Z"));
        assert_eq!(contract_no.confidence, 1.0);
        assert!(!contract_no.needs_resolution);
        assert_eq!(contract_no.resolution_method, ResolutionMethod::User);
        assert_eq!(field(&resolved, "taxRate").resolution_method, ResolutionMethod::Vote);
    }

    #[tokio::test]
    async fn test_llm_resolution() {
        let provider = Arc::new(MockProvider::new("{}"));
        provider.add_response("Resolve conflicting values", r#"{"value": "Y", "confidence": 0.9}"#);
        let engine = VotingEngine::new(equal_weights())
            .with_model(Arc::new(ModelClient::from_arc(Arc::clone(&provider))), 100, 1_000)
            .with_registry(Arc::new(TopicRegistry::contract_defaults()));

        let resolved = engine
            .resolve_conflicts(split_votes(), "合同编号：Y", &Resolution::Llm)
            .await;
        let contract_no = field(&resolved, "contractNo");
        assert_eq!(contract_no.agreed_value, json!("Y"));
        assert_eq!(contract_no.confidence, 0.9);
        assert_eq!(contract_no.resolution_method, ResolutionMethod::Llm);

        // only the conflicted field went to the model
        assert_eq!(provider.call_count(), 1);
        let request = &provider.requests()[0];
        assert!(request.system_prompt.contains("Field: contractNo"));
        assert!(request.user_prompt.contains("1. \"X\""));
        assert!(request.user_prompt.contains("合同编号：Y"));
    }

    #[tokio::test]
    async fn test_llm_resolution_defaults_and_failures() {
        let provider = Arc::new(MockProvider::new("{}"));
        provider.push_response(r#"{"index": 2}"#);
        let engine = VotingEngine::new(equal_weights())
            .with_model(Arc::new(ModelClient::from_arc(Arc::clone(&provider))), 100, 1_000);
        let resolved = engine
            .resolve_conflicts(split_votes(), "text", &Resolution::Llm)
            .await;
        let contract_no = field(&resolved, "contractNo");
        assert_eq!(contract_no.agreed_value, json!("Y"));
        assert_eq!(contract_no.confidence, DEFAULT_LLM_CONFIDENCE);

        // "{}" carries no value: the field stays flagged
        let unresolved = engine
            .resolve_conflicts(split_votes(), "text", &Resolution::Llm)
            .await;
        assert!(field(&unresolved, "contractNo").needs_resolution);

        let without_model = VotingEngine::new(equal_weights())
            .resolve_conflicts(split_votes(), "text", &Resolution::Llm)
            .await;
        assert_eq!(without_model, split_votes());
    }
}
