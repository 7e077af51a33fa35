//! Strategy results

use crate::value::{filled_count, FieldMap};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The output of one strategy invocation
///
/// Produced once and never mutated afterwards. A failed strategy still
/// produces a result: empty fields, zero scores and a warning saying why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    /// Name of the strategy that produced this result
    pub strategy_name: String,

    /// Extracted field values
    pub fields: FieldMap,

    /// Completeness over the attempted topics, in [0, 100]
    pub completeness: f64,

    /// Strategy-specific confidence heuristic, in [0, 100]
    pub confidence: f64,

    /// Human-readable notes about degraded topics or failures
    pub warnings: Vec<String>,

    /// Wall-clock duration of the run
    pub duration_ms: u64,

    /// Unix milliseconds at creation
    pub timestamp: u64,

    /// Topics the strategy attempted
    #[serde(default)]
    pub topics: Vec<String>,
}

impl StrategyResult {
    /// Create a result, clamping scores into [0, 100]
    pub fn new(
        strategy_name: impl Into<String>,
        fields: FieldMap,
        completeness: f64,
        confidence: f64,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            fields,
            completeness: clamp_score(completeness),
            confidence: clamp_score(confidence),
            warnings: Vec::new(),
            duration_ms: 0,
            timestamp: now_ms(),
            topics: Vec::new(),
        }
    }

    /// A failed run: no fields, zero scores, one warning
    pub fn failed(strategy_name: impl Into<String>, warning: impl Into<String>) -> Self {
        let mut result = Self::new(strategy_name, FieldMap::new(), 0.0, 0.0);
        result.warnings.push(warning.into());
        result
    }

    /// Attach warnings
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Attach the run duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Attach the attempted topics
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Number of fields holding a real value
    pub fn filled_fields(&self) -> usize {
        filled_count(&self.fields)
    }

    /// True if the run produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.filled_fields() == 0
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
