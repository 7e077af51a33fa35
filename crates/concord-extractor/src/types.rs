//! Request and response types for extraction

use concord_domain::topic::names;
use concord_domain::{
    CompletenessScoreBreakdown, ExtractionId, StrategyResult, ValidationResult, VoteResult,
};
use concord_gatekeeper::AbortSignal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Broad contract category, used to narrow which topics are worth asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    /// Fixed-price project delivery, paid by milestones
    ProjectOutsourcing,
    /// Personnel billed by rate
    StaffAugmentation,
    /// Products with quantities and unit prices
    ProductSales,
    /// Anything combining the above
    Mixed,
}

impl ContractType {
    /// Get the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::ProjectOutsourcing => "PROJECT_OUTSOURCING",
            ContractType::StaffAugmentation => "STAFF_AUGMENTATION",
            ContractType::ProductSales => "PRODUCT_SALES",
            ContractType::Mixed => "MIXED",
        }
    }

    /// Parse a wire name, ignoring case and surrounding whitespace
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "PROJECT_OUTSOURCING" => Some(ContractType::ProjectOutsourcing),
            "STAFF_AUGMENTATION" => Some(ContractType::StaffAugmentation),
            "PRODUCT_SALES" => Some(ContractType::ProductSales),
            "MIXED" => Some(ContractType::Mixed),
            _ => None,
        }
    }

    /// Topics that do not apply to this contract type
    pub fn skipped_topics(&self) -> &'static [&'static str] {
        match self {
            ContractType::ProjectOutsourcing => &[names::RATE_ITEMS, names::LINE_ITEMS],
            ContractType::StaffAugmentation => &[names::MILESTONES, names::LINE_ITEMS],
            ContractType::ProductSales => &[names::MILESTONES, names::RATE_ITEMS],
            ContractType::Mixed => &[],
        }
    }
}

/// How conflicting fields are settled after voting
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Apply explicit user choices, field name to value
    User(BTreeMap<String, Value>),
    /// Ask the model to adjudicate each conflicted field
    Llm,
}

/// Request to extract contract fields from text
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    /// Document text (markdown or plain)
    pub text: String,

    /// Strategies to run; all available ones when absent
    pub strategies: Option<Vec<String>>,

    /// Topics to extract; all registered ones when absent
    pub topics: Option<Vec<String>>,

    /// Run the validate-and-correct loop on the merged result
    pub enable_validation_retry: bool,

    /// Original file, for strategies that convert documents themselves
    pub file_path: Option<PathBuf>,

    /// Conflict resolution to apply after voting
    pub resolution: Option<Resolution>,

    /// Override of the configured contract-type narrowing
    pub narrow_by_contract_type: Option<bool>,

    /// Cancellation signal
    pub abort: Option<AbortSignal>,
}

impl ExtractionRequest {
    /// Create a request over `text` with default options
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Restrict the strategies to run
    pub fn with_strategies<S: Into<String>>(mut self, strategies: impl IntoIterator<Item = S>) -> Self {
        self.strategies = Some(strategies.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the topics to extract
    pub fn with_topics<S: Into<String>>(mut self, topics: impl IntoIterator<Item = S>) -> Self {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable the validate-and-correct loop
    pub fn with_validation_retry(mut self, enabled: bool) -> Self {
        self.enable_validation_retry = enabled;
        self
    }

    /// Attach the original file
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Settle conflicts after voting
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Override contract-type narrowing for this request
    pub fn with_narrowing(mut self, narrow: bool) -> Self {
        self.narrow_by_contract_type = Some(narrow);
        self
    }

    /// Attach a cancellation signal
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }
}

/// Result of an extraction operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    /// Correlation id of this extraction
    pub id: ExtractionId,

    /// Final field values
    pub fields: BTreeMap<String, Value>,

    /// Weighted completeness of the final fields
    pub completeness: CompletenessScoreBreakdown,

    /// Overall confidence, in [0, 100]
    pub confidence: f64,

    /// Voting detail per field
    pub per_field_votes: Vec<VoteResult>,

    /// Degraded strategies, skipped topics, validation findings
    pub warnings: Vec<String>,

    /// Raw result of every strategy that ran
    pub strategies: Vec<StrategyResult>,

    /// Validation per topic that had at least one value
    pub validation: BTreeMap<String, ValidationResult>,

    /// Contract type reported by a strategy, if any
    pub contract_type: Option<ContractType>,

    /// True when the extraction stopped on an abort signal
    pub aborted: bool,

    /// Wall-clock duration
    pub duration_ms: u64,
}

impl ExtractionOutcome {
    /// Fields that still need a human or model decision
    pub fn conflicts(&self) -> Vec<&VoteResult> {
        self.per_field_votes
            .iter()
            .filter(|v| v.needs_resolution && !v.votes.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_type_round_trip() {
        for t in [
            ContractType::ProjectOutsourcing,
            ContractType::StaffAugmentation,
            ContractType::ProductSales,
            ContractType::Mixed,
        ] {
            assert_eq!(ContractType::parse(t.as_str()), Some(t));
        }
        assert_eq!(
            ContractType::parse(" product-sales "),
            Some(ContractType::ProductSales)
        );
        assert_eq!(ContractType::parse("LEASE"), None);
    }

    #[test]
    fn test_skipped_topics() {
        assert_eq!(
            ContractType::ProductSales.skipped_topics(),
            &["milestones", "rate_items"]
        );
        assert!(ContractType::Mixed.skipped_topics().is_empty());
    }

    #[test]
    fn test_request_builder() {
        let request = ExtractionRequest::new("text")
            .with_strategies(["pattern", "rag"])
            .with_topics(vec!["financial".to_string()])
            .with_validation_retry(true)
            .with_narrowing(true);
        assert_eq!(request.strategies.as_deref(), Some(&["pattern".to_string(), "rag".to_string()][..]));
        assert_eq!(request.topics.unwrap(), vec!["financial"]);
        assert!(request.enable_validation_retry);
        assert_eq!(request.narrow_by_contract_type, Some(true));
        assert!(request.abort.is_none());
    }

    #[test]
    fn test_contract_type_serializes_screaming() {
        let json = serde_json::to_value(ContractType::StaffAugmentation).unwrap();
        assert_eq!(json, "STAFF_AUGMENTATION");
    }
}
