//! Pattern-match strategy

use super::{finish, names, restrict_to_topics, selected_topics, Strategy, StrategyOptions};
use crate::patterns::extract_fields;
use async_trait::async_trait;
use concord_domain::value::filled_count;
use concord_domain::{StrategyResult, TopicRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Labeled regular expressions and pipe tables over the raw text
pub struct PatternStrategy {
    registry: Arc<TopicRegistry>,
}

impl PatternStrategy {
    /// Create the strategy
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Strategy for PatternStrategy {
    fn name(&self) -> &str {
        names::PATTERN
    }

    fn is_available(&self) -> bool {
        true
    }

    fn priority(&self) -> u32 {
        100
    }

    async fn parse(&self, text: &str, options: &StrategyOptions) -> StrategyResult {
        let started = Instant::now();
        let topics = selected_topics(&self.registry, options);
        let fields = restrict_to_topics(extract_fields(text), &topics);

        let filled = filled_count(&fields);
        let mut warnings = Vec::new();
        let confidence = if filled == 0 {
            warnings.push("no labeled values matched".to_string());
            0.0
        } else {
            (40.0 + 5.0 * filled as f64).min(95.0)
        };
        debug!(filled, "Pattern strategy finished");

        finish(
            self.name(),
            &self.registry,
            fields,
            &topics,
            confidence,
            warnings,
            started,
        )
    }
}
