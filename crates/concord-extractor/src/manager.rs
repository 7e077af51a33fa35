//! Strategy registry and isolated strategy execution
//!
//! Every run is spawned as its own task under a per-strategy timeout, so a
//! strategy that panics or hangs is dropped from the batch instead of taking
//! the whole extraction down with it.

use crate::error::ExtractorError;
use crate::strategy::{Strategy, StrategyOptions};
use concord_domain::StrategyResult;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A strategy that was asked for but produced no result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStrategy {
    /// Strategy name
    pub strategy: String,
    /// Why it was omitted
    pub reason: String,
}

/// Results of a multi-strategy run plus what was left out
#[derive(Debug, Clone, Default)]
pub struct ManagerReport {
    /// Results in request order
    pub results: Vec<StrategyResult>,
    /// Strategies that were unknown, unavailable, failed or timed out
    pub skipped: Vec<SkippedStrategy>,
}

/// Holds the registered strategies and runs them
pub struct StrategyManager {
    strategies: Vec<Arc<dyn Strategy>>,
    timeout: Duration,
    max_concurrency: usize,
}

impl StrategyManager {
    /// Create an empty manager; runs are sequential until
    /// [`with_max_concurrency`](Self::with_max_concurrency) says otherwise
    pub fn new(timeout: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            timeout,
            max_concurrency: 1,
        }
    }

    /// Run up to `max_concurrency` strategies at once
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Register a strategy, replacing any strategy with the same name
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        let name = strategy.name().to_string();
        if let Some(slot) = self.strategies.iter_mut().find(|s| s.name() == name) {
            warn!(strategy = %name, "Replacing registered strategy");
            *slot = strategy;
        } else {
            debug!(strategy = %name, priority = strategy.priority(), "Registered strategy");
            self.strategies.push(strategy);
        }
    }

    /// Remove a strategy by name
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Strategy>> {
        let index = self.strategies.iter().position(|s| s.name() == name)?;
        Some(self.strategies.remove(index))
    }

    /// Look up a strategy by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.iter().find(|s| s.name() == name).cloned()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Available strategies, highest priority first
    pub fn available(&self) -> Vec<Arc<dyn Strategy>> {
        let mut available: Vec<Arc<dyn Strategy>> = self
            .strategies
            .iter()
            .filter(|s| s.is_available())
            .cloned()
            .collect();
        available.sort_by(|a, b| b.priority().cmp(&a.priority()));
        available
    }

    /// The available strategy with the highest priority
    pub fn best(&self) -> Option<Arc<dyn Strategy>> {
        self.available().into_iter().next()
    }

    /// Static priority of every registered strategy
    pub fn priorities(&self) -> BTreeMap<String, u32> {
        self.strategies
            .iter()
            .map(|s| (s.name().to_string(), s.priority()))
            .collect()
    }

    /// Run one strategy by name
    ///
    /// # Errors
    ///
    /// `NotRegistered` or `Unavailable` before the run; `Timeout` or
    /// `StrategyFailed` when the run itself does not complete.
    pub async fn run_one(
        &self,
        name: &str,
        text: &str,
        options: &StrategyOptions,
    ) -> Result<StrategyResult, ExtractorError> {
        self.run_shared(name, Arc::from(text), options.clone()).await
    }

    async fn run_shared(
        &self,
        name: &str,
        text: Arc<str>,
        options: StrategyOptions,
    ) -> Result<StrategyResult, ExtractorError> {
        let strategy = self
            .get(name)
            .ok_or_else(|| ExtractorError::NotRegistered(name.to_string()))?;
        if !strategy.is_available() {
            return Err(ExtractorError::Unavailable(name.to_string()));
        }

        debug!(strategy = %name, "Starting strategy");
        let mut handle = tokio::spawn(async move { strategy.parse(&text, &options).await });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => {
                info!(
                    strategy = %name,
                    fields = result.filled_fields(),
                    completeness = result.completeness,
                    confidence = result.confidence,
                    duration_ms = result.duration_ms,
                    "Strategy finished"
                );
                Ok(result)
            }
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(ExtractorError::StrategyFailed(format!("{} panicked", name)))
            }
            Ok(Err(join_error)) => Err(ExtractorError::StrategyFailed(format!(
                "{}: {}",
                name, join_error
            ))),
            Err(_) => {
                handle.abort();
                Err(ExtractorError::Timeout(format!(
                    "strategy {} after {}s",
                    name,
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }

    /// Run the named strategies, omitting any that fail
    pub async fn run_many(
        &self,
        names: &[String],
        text: &str,
        options: &StrategyOptions,
    ) -> Vec<StrategyResult> {
        self.run_many_detailed(names, text, options).await.results
    }

    /// Run the named strategies and report the ones left out
    pub async fn run_many_detailed(
        &self,
        names: &[String],
        text: &str,
        options: &StrategyOptions,
    ) -> ManagerReport {
        let text: Arc<str> = Arc::from(text);
        let outcomes: Vec<(String, Result<StrategyResult, ExtractorError>)> =
            stream::iter(names.iter().cloned())
                .map(|name| {
                    let text = Arc::clone(&text);
                    let options = options.clone();
                    async move {
                        let outcome = self.run_shared(&name, text, options).await;
                        (name, outcome)
                    }
                })
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let mut report = ManagerReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    warn!(strategy = %name, error = %e, "Strategy omitted");
                    report.skipped.push(SkippedStrategy {
                        strategy: name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Run every available strategy, highest priority first
    pub async fn run_all_available(&self, text: &str, options: &StrategyOptions) -> Vec<StrategyResult> {
        let names: Vec<String> = self
            .available()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        self.run_many(&names, text, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concord_domain::FieldMap;
    use serde_json::json;

    enum Behavior {
        Answer,
        Panic,
        Hang,
    }

    struct TestStrategy {
        name: &'static str,
        priority: u32,
        available: bool,
        behavior: Behavior,
    }

    impl TestStrategy {
        fn new(name: &'static str, priority: u32) -> Self {
            Self {
                name,
                priority,
                available: true,
                behavior: Behavior::Answer,
            }
        }

        fn behaving(mut self, behavior: Behavior) -> Self {
            self.behavior = behavior;
            self
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }
    }

    #[async_trait]
    impl Strategy for TestStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        async fn parse(&self, text: &str, _options: &StrategyOptions) -> StrategyResult {
            match self.behavior {
                Behavior::Answer => {
                    let mut fields = FieldMap::new();
                    fields.insert("contractNo".into(), json!(text));
                    StrategyResult::new(self.name, fields, 10.0, 50.0)
                }
                Behavior::Panic => panic!("strategy blew up"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    StrategyResult::failed(self.name, "unreachable")
                }
            }
        }
    }

    fn manager() -> StrategyManager {
        let mut manager = StrategyManager::new(Duration::from_millis(200));
        manager.register(Arc::new(TestStrategy::new("low", 10)));
        manager.register(Arc::new(TestStrategy::new("high", 90)));
        manager.register(Arc::new(TestStrategy::new("off", 100).unavailable()));
        manager
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_available_sorted_by_priority() {
        let manager = manager();
        let available: Vec<String> = manager
            .available()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(available, vec!["high", "low"]);
        assert_eq!(manager.best().map(|s| s.name().to_string()), Some("high".into()));
        assert_eq!(manager.priorities()["off"], 100);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut manager = manager();
        manager.register(Arc::new(TestStrategy::new("low", 95)));
        assert_eq!(manager.names(), vec!["low", "high", "off"]);
        assert_eq!(manager.best().map(|s| s.name().to_string()), Some("low".into()));

        assert!(manager.unregister("low").is_some());
        assert!(manager.unregister("low").is_none());
        assert!(manager.get("low").is_none());
    }

    #[tokio::test]
    async fn test_run_one_errors() {
        let manager = manager();
        let options = StrategyOptions::default();
        assert_eq!(
            manager.run_one("missing", "x", &options).await.unwrap_err(),
            ExtractorError::NotRegistered("missing".into())
        );
        assert_eq!(
            manager.run_one("off", "x", &options).await.unwrap_err(),
            ExtractorError::Unavailable("off".into())
        );
        let result = manager.run_one("low", "CT-1", &options).await.unwrap();
        assert_eq!(result.fields["contractNo"], json!("CT-1"));
    }

    #[tokio::test]
    async fn test_panicking_strategy_is_omitted() {
        let mut manager = manager();
        manager.register(Arc::new(TestStrategy::new("boom", 50).behaving(Behavior::Panic)));

        let report = manager
            .run_many_detailed(&names(&["low", "boom", "high"]), "x", &StrategyOptions::default())
            .await;
        let ran: Vec<&str> = report.results.iter().map(|r| r.strategy_name.as_str()).collect();
        assert_eq!(ran, vec!["low", "high"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].strategy, "boom");
        assert!(report.skipped[0].reason.contains("panicked"));
    }

    #[tokio::test]
    async fn test_hanging_strategy_times_out() {
        let mut manager = manager();
        manager.register(Arc::new(TestStrategy::new("slow", 50).behaving(Behavior::Hang)));

        let err = manager
            .run_one("slow", "x", &StrategyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractorError::Timeout(_)));

        let results = manager
            .run_many(&names(&["slow", "high"]), "x", &StrategyOptions::default())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy_name, "high");
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_request_order() {
        let mut manager = StrategyManager::new(Duration::from_secs(5)).with_max_concurrency(4);
        for (name, priority) in [("a", 1), ("b", 2), ("c", 3)] {
            manager.register(Arc::new(TestStrategy::new(name, priority)));
        }
        let results = manager
            .run_many(&names(&["c", "a", "b", "unknown"]), "x", &StrategyOptions::default())
            .await;
        let ran: Vec<&str> = results.iter().map(|r| r.strategy_name.as_str()).collect();
        assert_eq!(ran, vec!["c", "a", "b"]);

        let all = manager.run_all_available("x", &StrategyOptions::default()).await;
        assert_eq!(all[0].strategy_name, "c");
    }
}
