//! Per-field voting results

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a field's agreed value was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    /// Weighted vote across strategies
    Vote,
    /// Chosen explicitly by a user
    User,
    /// Adjudicated by the language model
    Llm,
}

impl ResolutionMethod {
    /// Get the method name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::Vote => "vote",
            ResolutionMethod::User => "user",
            ResolutionMethod::Llm => "llm",
        }
    }
}

/// One strategy's vote for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Voting strategy
    pub strategy_name: String,
    /// Proposed value
    pub value: Value,
    /// Configured weight of the strategy
    pub weight: f64,
}

/// Outcome of voting on one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    /// Field name
    pub field_name: String,
    /// All votes cast for the field
    pub votes: Vec<Vote>,
    /// Winning value, `null` when nobody voted
    pub agreed_value: Value,
    /// Winning weight share, in [0, 1]
    pub confidence: f64,
    /// True when the share is below the threshold and a human or model should decide
    pub needs_resolution: bool,
    /// How the agreed value was settled
    pub resolution_method: ResolutionMethod,
}

impl VoteResult {
    /// Distinct values proposed for this field, in first-seen order
    pub fn candidates(&self) -> Vec<&Value> {
        let mut seen: Vec<&Value> = Vec::new();
        for vote in &self.votes {
            if !seen.contains(&&vote.value) {
                seen.push(&vote.value);
            }
        }
        seen
    }

    /// True if at least two strategies proposed different values
    pub fn is_contested(&self) -> bool {
        self.candidates().len() > 1
    }
}
