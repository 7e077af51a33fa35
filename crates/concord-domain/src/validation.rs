//! Validation results and the quality score

use serde::{Deserialize, Serialize};
use std::fmt;

/// Points deducted per error
pub const ERROR_PENALTY: u32 = 20;

/// Points deducted per warning
pub const WARNING_PENALTY: u32 = 5;

/// One plausibility problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Field the issue concerns (or the topic name for topic-wide issues)
    pub field: String,
    /// What is wrong
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of validating one topic's fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Hard failures
    pub errors: Vec<ValidationIssue>,
    /// Soft failures
    pub warnings: Vec<ValidationIssue>,
    /// `max(0, 100 - 20 * errors - 5 * warnings)`
    pub score: u32,
    /// True when there are no errors
    pub is_valid: bool,
}

impl ValidationResult {
    /// Build a result, computing score and validity from the issues
    ///
    /// # Examples
    ///
    /// ```
    /// use concord_domain::{ValidationIssue, ValidationResult};
    ///
    /// let result = ValidationResult::from_issues(
    ///     vec![ValidationIssue::new("taxRate", "out of range")],
    ///     vec![ValidationIssue::new("amountWithTax", "suspiciously small")],
    /// );
    /// assert_eq!(result.score, 75);
    /// assert!(!result.is_valid);
    /// ```
    pub fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        let penalty = ERROR_PENALTY.saturating_mul(errors.len() as u32)
            + WARNING_PENALTY.saturating_mul(warnings.len() as u32);
        let score = 100u32.saturating_sub(penalty);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            score,
        }
    }

    /// A clean result
    pub fn clean() -> Self {
        Self::from_issues(Vec::new(), Vec::new())
    }

    /// Every error and warning rendered as text, errors first
    pub fn messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("error: {}", e))
            .chain(self.warnings.iter().map(|w| format!("warning: {}", w)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues(n: usize) -> Vec<ValidationIssue> {
        (0..n).map(|i| ValidationIssue::new(format!("f{i}"), "bad")).collect()
    }

    #[test]
    fn test_one_error_one_warning_scores_75() {
        let result = ValidationResult::from_issues(issues(1), issues(1));
        assert_eq!(result.score, 75);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_six_errors_floor_at_zero() {
        let result = ValidationResult::from_issues(issues(6), Vec::new());
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_warnings_only_stay_valid() {
        let result = ValidationResult::from_issues(Vec::new(), issues(3));
        assert_eq!(result.score, 85);
        assert!(result.is_valid);
    }

    #[test]
    fn test_messages_order() {
        let result = ValidationResult::from_issues(issues(1), issues(1));
        let messages = result.messages();
        assert!(messages[0].starts_with("error: f0"));
        assert!(messages[1].starts_with("warning: f0"));
    }
}
