//! Validate-and-correct loop
//!
//! A result that fails validation is sent back to the model together with
//! the issues found and an excerpt of the document. Correction starts only
//! when the initial result is empty or `RetryConfig::should_retry` says so;
//! after that
//! the loop runs until a result reaches `accept_score` or
//! `RetryConfig::max_retries` corrections were made, and always returns the
//! best attempt seen.

use crate::abort::AbortSignal;
use crate::{Gatekeeper, GatekeeperError, RetryConfig};
use concord_domain::traits::CompletionRequest;
use concord_domain::{is_filled, FieldMap, TopicDefinition, ValidationResult};
use concord_llm::ModelService;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CORRECTION_INSTRUCTIONS: &str = r#"You review and correct fields extracted from a contract.

You are given a previous extraction as JSON, the problems a validator found in it,
and an excerpt of the contract. Return ONLY a JSON object containing the corrected
fields listed below. Rules:
- Use values that appear in the contract excerpt; do not invent data.
- Amounts are plain numbers without currency symbols or thousands separators.
- Tax rates are fractions (6% becomes 0.06).
- Dates use YYYY-MM-DD.
- Use null for fields the excerpt does not contain."#;

/// One pass through the loop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// 0 for the initial result, then 1..=max_retries for corrections
    pub attempt: u32,
    /// Fields after this attempt
    pub fields: FieldMap,
    /// Validation of those fields, absent when the model call failed
    pub validation: Option<ValidationResult>,
    /// Why the model call failed
    pub error: Option<String>,
}

/// Final state of the loop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    /// Best-scoring fields seen
    pub fields: FieldMap,
    /// Validation of the best fields
    pub validation: ValidationResult,
    /// Number of correction calls made
    pub attempts: u32,
    /// Every attempt in order, the initial result first
    pub history: Vec<RetryAttempt>,
    /// True when the loop stopped on an abort signal
    pub aborted: bool,
}

enum State {
    Validate { fields: FieldMap, attempt: u32 },
    Decide { current: FieldMap, validation: ValidationResult },
    Correct { current: FieldMap, validation: ValidationResult },
    Done { aborted: bool },
}

/// Runs the bounded validate-and-correct state machine for one topic
pub struct RetryLoop {
    model: Arc<dyn ModelService>,
    gatekeeper: Arc<Gatekeeper>,
    config: RetryConfig,
}

impl RetryLoop {
    /// Create a loop; fails on an invalid configuration
    pub fn new(
        model: Arc<dyn ModelService>,
        gatekeeper: Arc<Gatekeeper>,
        config: RetryConfig,
    ) -> Result<Self, GatekeeperError> {
        config.validate().map_err(GatekeeperError::Config)?;
        Ok(Self {
            model,
            gatekeeper,
            config,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Validate `initial` for `topic`, correcting it through the model while
    /// it scores poorly
    pub async fn validate_with_retry(
        &self,
        initial: FieldMap,
        source_text: &str,
        topic: &str,
        abort: Option<&AbortSignal>,
    ) -> RetryOutcome {
        let mut history: Vec<RetryAttempt> = Vec::new();
        let mut best: Option<(FieldMap, ValidationResult)> = None;
        let mut corrections: u32 = 0;
        let mut state = State::Validate {
            fields: initial,
            attempt: 0,
        };

        let aborted = loop {
            state = match state {
                State::Validate { fields, attempt } => {
                    let validation = self.gatekeeper.validate(&fields, topic, Some(source_text));
                    debug!(topic, attempt, score = validation.score, "Attempt validated");

                    history.push(RetryAttempt {
                        attempt,
                        fields: fields.clone(),
                        validation: Some(validation.clone()),
                        error: None,
                    });
                    let improves = best
                        .as_ref()
                        .map(|(_, b)| validation.score > b.score)
                        .unwrap_or(true);
                    if improves {
                        best = Some((fields.clone(), validation.clone()));
                    }
                    State::Decide {
                        current: fields,
                        validation,
                    }
                }
                State::Decide {
                    current,
                    validation,
                } => {
                    let best_score = best.as_ref().map(|(_, b)| b.score).unwrap_or(0);
                    if abort.map(AbortSignal::is_aborted).unwrap_or(false) {
                        State::Done { aborted: true }
                    } else if best_score >= self.config.accept_score
                        || (corrections == 0 && !needs_correction(&current, &validation, &self.config))
                        || corrections >= self.config.max_retries
                    {
                        State::Done { aborted: false }
                    } else {
                        State::Correct {
                            current,
                            validation,
                        }
                    }
                }
                State::Correct {
                    current,
                    validation,
                } => {
                    corrections += 1;
                    let call = self.correct(&current, &validation, source_text, topic);
                    let result = match abort {
                        Some(signal) => tokio::select! {
                            result = call => Some(result),
                            _ = signal.aborted() => None,
                        },
                        None => Some(call.await),
                    };

                    match result {
                        None => State::Done { aborted: true },
                        Some(Ok(corrected)) => State::Validate {
                            fields: corrected,
                            attempt: corrections,
                        },
                        Some(Err(e)) => {
                            warn!(topic, attempt = corrections, error = %e, "Correction call failed");
                            history.push(RetryAttempt {
                                attempt: corrections,
                                fields: current.clone(),
                                validation: None,
                                error: Some(e.to_string()),
                            });
                            State::Decide {
                                current,
                                validation,
                            }
                        }
                    }
                }
                State::Done { aborted } => break aborted,
            };
        };

        let (fields, validation) = best.unwrap_or_else(|| (FieldMap::new(), ValidationResult::clean()));
        info!(
            topic,
            attempts = corrections,
            score = validation.score,
            aborted,
            "Retry loop finished"
        );
        RetryOutcome {
            fields,
            validation,
            attempts: corrections,
            history,
            aborted,
        }
    }

    /// Ask the model for one corrected version of `current`
    ///
    /// Returns `current` merged with every filled value the model supplied
    /// for the topic's fields.
    pub async fn correct(
        &self,
        current: &FieldMap,
        validation: &ValidationResult,
        source_text: &str,
        topic: &str,
    ) -> Result<FieldMap, GatekeeperError> {
        let definition = self.gatekeeper.registry().get_safe(topic);
        let request = CompletionRequest::new(
            self.system_prompt(topic, definition),
            self.user_prompt(current, validation, source_text),
        )
        .with_timeout_ms(self.config.call_timeout_ms);

        let value = self.model.complete_json(request).await?;
        let corrected = match definition {
            Some(definition) => definition.fields_from_json(&value),
            None => value
                .as_object()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        };

        let mut merged = current.clone();
        for (name, value) in corrected {
            if is_filled(&value) {
                merged.insert(name, value);
            }
        }
        Ok(merged)
    }

    fn system_prompt(&self, topic: &str, definition: Option<&TopicDefinition>) -> String {
        let mut prompt = String::from(CORRECTION_INSTRUCTIONS);
        prompt.push_str(&format!("\n\nTopic: {}\nFields:\n", topic));
        if let Some(definition) = definition {
            for field in &definition.fields {
                prompt.push_str(&format!(
                    "- {} ({:?}): {}\n",
                    field.name, field.field_type, field.description
                ));
            }
        }
        prompt
    }

    fn user_prompt(&self, current: &FieldMap, validation: &ValidationResult, source: &str) -> String {
        let previous = serde_json::to_string_pretty(current).unwrap_or_else(|_| "{}".to_string());
        let problems = validation
            .messages()
            .into_iter()
            .map(|m| format!("- {}", m))
            .collect::<Vec<_>>()
            .join("\n");
        let excerpt: String = source.chars().take(self.config.excerpt_chars).collect();

        format!(
            "Previous extraction:\n{}\n\nProblems found:\n{}\n\nContract excerpt:\n{}",
            previous, problems, excerpt
        )
    }
}

/// An initial result is corrected when it scores poorly or holds no values at all
fn needs_correction(initial: &FieldMap, validation: &ValidationResult, config: &RetryConfig) -> bool {
    config.should_retry(validation) || !initial.values().any(is_filled)
}
