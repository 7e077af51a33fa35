//! Gatekeeper configuration

use crate::GatekeeperError;
use concord_domain::ValidationResult;
use serde::{Deserialize, Serialize};

/// Thresholds for the plausibility rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Longest acceptable party name
    pub max_party_name_chars: usize,

    /// Longest contract number before a warning
    pub max_contract_no_chars: usize,

    /// Amounts below this are suspicious
    pub min_plausible_amount: f64,

    /// Amounts above this are suspicious
    pub max_plausible_amount: f64,

    /// Milestone percentages further than this from 100 are an error
    pub milestone_sum_error_points: f64,

    /// Milestone percentages further than this from 100 are a warning
    pub milestone_sum_warning_points: f64,

    /// Relative tolerance between subtotal and quantity x unit price
    pub line_item_tolerance: f64,

    /// Clauses longer than this are a warning
    pub max_clause_chars: usize,

    /// Check that short extracted strings occur in the source text
    pub check_source_presence: bool,

    /// Only strings up to this length are checked against the source
    pub source_check_max_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_party_name_chars: 100,
            max_contract_no_chars: 64,
            min_plausible_amount: 100.0,
            max_plausible_amount: 1e10,
            milestone_sum_error_points: 5.0,
            milestone_sum_warning_points: 0.01,
            line_item_tolerance: 0.01,
            max_clause_chars: 2000,
            check_source_presence: true,
            source_check_max_chars: 50,
        }
    }
}

impl ValidationConfig {
    /// Create a permissive configuration (wider ranges, no source checks)
    pub fn permissive() -> Self {
        Self {
            max_party_name_chars: 200,
            max_contract_no_chars: 128,
            min_plausible_amount: 0.0,
            max_plausible_amount: 1e12,
            milestone_sum_error_points: 10.0,
            milestone_sum_warning_points: 1.0,
            line_item_tolerance: 0.05,
            max_clause_chars: 5000,
            check_source_presence: false,
            source_check_max_chars: 0,
        }
    }

    /// Create a strict configuration (tighter ranges, longer source checks)
    pub fn strict() -> Self {
        Self {
            max_party_name_chars: 60,
            max_contract_no_chars: 40,
            min_plausible_amount: 1000.0,
            max_plausible_amount: 1e9,
            milestone_sum_error_points: 1.0,
            milestone_sum_warning_points: 0.01,
            line_item_tolerance: 0.005,
            max_clause_chars: 1500,
            check_source_presence: true,
            source_check_max_chars: 120,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_plausible_amount < 0.0 {
            return Err("min_plausible_amount must be non-negative".to_string());
        }
        if self.max_plausible_amount <= self.min_plausible_amount {
            return Err("max_plausible_amount must exceed min_plausible_amount".to_string());
        }
        if self.milestone_sum_warning_points > self.milestone_sum_error_points {
            return Err(
                "milestone_sum_warning_points must not exceed milestone_sum_error_points"
                    .to_string(),
            );
        }
        if !(0.0..1.0).contains(&self.line_item_tolerance) {
            return Err("line_item_tolerance must be in [0, 1)".to_string());
        }
        Ok(())
    }
}

/// Limits for the validate-and-correct loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of correction calls
    pub max_retries: u32,

    /// Initial results scoring below this (or with errors) are corrected;
    /// once correcting, the loop continues until `accept_score`
    pub retry_below_score: u32,

    /// Results scoring at least this stop the loop
    pub accept_score: u32,

    /// Characters of source text included in a correction prompt
    pub excerpt_chars: usize,

    /// Budget for one correction call
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_below_score: 70,
            accept_score: 85,
            excerpt_chars: 4000,
            call_timeout_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Create an aggressive configuration (more attempts, higher bar)
    pub fn aggressive() -> Self {
        Self {
            max_retries: 4,
            retry_below_score: 85,
            accept_score: 95,
            excerpt_chars: 8000,
            call_timeout_ms: 90_000,
        }
    }

    /// Create a lenient configuration (one attempt, lower bar)
    pub fn lenient() -> Self {
        Self {
            max_retries: 1,
            retry_below_score: 50,
            accept_score: 70,
            excerpt_chars: 2000,
            call_timeout_ms: 30_000,
        }
    }

    /// True when an initial result should be sent back for correction
    pub fn should_retry(&self, result: &ValidationResult) -> bool {
        !result.is_valid || result.score < self.retry_below_score
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.accept_score > 100 {
            return Err("accept_score must be at most 100".to_string());
        }
        if self.retry_below_score > self.accept_score {
            return Err("retry_below_score must not exceed accept_score".to_string());
        }
        if self.call_timeout_ms == 0 {
            return Err("call_timeout_ms must be positive".to_string());
        }
        Ok(())
    }

    /// Load from TOML
    pub fn from_toml(s: &str) -> Result<Self, GatekeeperError> {
        let config: Self = toml::from_str(s)?;
        config.validate().map_err(GatekeeperError::Config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_domain::ValidationIssue;

    #[test]
    fn test_default_config() {
        let config = ValidationConfig::default();
        assert_eq!(config.max_party_name_chars, 100);
        assert!(config.check_source_presence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_permissive_config() {
        let config = ValidationConfig::permissive();
        assert!(!config.check_source_presence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_config() {
        let config = ValidationConfig::strict();
        assert_eq!(config.milestone_sum_error_points, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_presets_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::aggressive().validate().is_ok());
        assert!(RetryConfig::lenient().validate().is_ok());
        assert_eq!(RetryConfig::default().max_retries, 2);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::default();
        let clean = ValidationResult::clean();
        assert!(!config.should_retry(&clean));

        let one_error = ValidationResult::from_issues(vec![ValidationIssue::new("a", "b")], vec![]);
        assert!(config.should_retry(&one_error));

        let many_warnings = ValidationResult::from_issues(
            vec![],
            (0..7).map(|i| ValidationIssue::new(format!("w{i}"), "w")).collect(),
        );
        assert_eq!(many_warnings.score, 65);
        assert!(config.should_retry(&many_warnings));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = RetryConfig::from_toml("max_retries = 5").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.accept_score, 85);

        let invalid = RetryConfig::from_toml("accept_score = 50\nretry_below_score = 60");
        assert!(matches!(invalid, Err(GatekeeperError::Config(_))));
    }
}
