//! Configuration for the Extractor

use crate::chunking::ChunkerConfig;
use crate::voting::VotingConfig;
use concord_gatekeeper::{RetryConfig, ValidationConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retrieval-augmented strategy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Chunks retrieved per topic query
    pub top_k: usize,

    /// Minimum cosine similarity for a retrieved chunk
    pub similarity_threshold: f32,

    /// Chunks embedded per batch
    pub embed_batch_size: usize,

    /// Pause between embedding batches (milliseconds)
    pub embed_batch_delay_ms: u64,

    /// Budget for one embedding batch (milliseconds)
    pub embed_timeout_ms: u64,

    /// Embedding dimension of the built-in n-gram model
    pub embedding_dimension: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.1,
            embed_batch_size: 16,
            embed_batch_delay_ms: 50,
            embed_timeout_ms: 30_000,
            embedding_dimension: 384,
        }
    }
}

/// Configuration for the Extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Maximum input text length (characters)
    pub max_text_length: usize,

    /// Maximum time for one strategy run (seconds)
    pub strategy_timeout_secs: u64,

    /// Maximum time for a single model call (seconds)
    pub model_timeout_secs: u64,

    /// Strategies run at once; 1 runs them sequentially
    pub max_concurrency: usize,

    /// Topic calls in flight at once inside a model-backed strategy
    pub topic_concurrency: usize,

    /// Skip topics that do not fit the classified contract type
    pub narrow_by_contract_type: bool,

    /// Characters of document context sent with a topic prompt
    pub max_context_chars: usize,

    /// Characters of document context sent with a conflict to the model
    pub resolution_excerpt_chars: usize,

    /// Chunking settings
    pub chunker: ChunkerConfig,

    /// Voting settings
    pub voting: VotingConfig,

    /// Plausibility rule thresholds
    pub validation: ValidationConfig,

    /// Validate-and-correct loop limits
    pub retry: RetryConfig,

    /// Retrieval-augmented strategy settings
    pub rag: RagConfig,
}

impl ExtractorConfig {
    /// Get the per-strategy timeout as a Duration
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    /// Get the per-call model timeout in milliseconds
    pub fn model_timeout_ms(&self) -> u64 {
        self.model_timeout_secs.saturating_mul(1000)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_text_length == 0 {
            return Err("max_text_length must be greater than 0".to_string());
        }
        if self.strategy_timeout_secs == 0 {
            return Err("strategy_timeout_secs must be greater than 0".to_string());
        }
        if self.model_timeout_secs == 0 {
            return Err("model_timeout_secs must be greater than 0".to_string());
        }
        if self.model_timeout_secs > self.strategy_timeout_secs {
            return Err("model_timeout_secs cannot exceed strategy_timeout_secs".to_string());
        }
        if self.max_concurrency == 0 || self.topic_concurrency == 0 {
            return Err("concurrency limits must be greater than 0".to_string());
        }
        if self.max_context_chars == 0 {
            return Err("max_context_chars must be greater than 0".to_string());
        }
        if self.rag.top_k == 0 || self.rag.embed_batch_size == 0 {
            return Err("rag.top_k and rag.embed_batch_size must be greater than 0".to_string());
        }
        if self.rag.embed_timeout_ms == 0 {
            return Err("rag.embed_timeout_ms must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.rag.similarity_threshold) {
            return Err("rag.similarity_threshold must be in [0, 1]".to_string());
        }
        self.chunker.validate()?;
        self.voting.validate()?;
        self.validation.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            max_text_length: 200_000,
            strategy_timeout_secs: 300,
            model_timeout_secs: 120,
            max_concurrency: 1,
            topic_concurrency: 2,
            narrow_by_contract_type: false,
            max_context_chars: 12_000,
            resolution_excerpt_chars: 2_000,
            chunker: ChunkerConfig::default(),
            voting: VotingConfig::default(),
            validation: ValidationConfig::default(),
            retry: RetryConfig::default(),
            rag: RagConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Aggressive preset: shorter timeouts, more parallelism, stricter retries
    pub fn aggressive() -> Self {
        Self {
            max_text_length: 100_000,
            strategy_timeout_secs: 120,
            model_timeout_secs: 60,
            max_concurrency: 4,
            topic_concurrency: 4,
            narrow_by_contract_type: true,
            max_context_chars: 8_000,
            resolution_excerpt_chars: 1_500,
            chunker: ChunkerConfig {
                max_chunk_chars: 3_000,
                ..ChunkerConfig::default()
            },
            voting: VotingConfig::default(),
            validation: ValidationConfig::strict(),
            retry: RetryConfig::aggressive(),
            rag: RagConfig {
                embed_batch_delay_ms: 0,
                ..RagConfig::default()
            },
        }
    }

    /// Lenient preset: longer timeouts, larger context, fewer retries
    pub fn lenient() -> Self {
        Self {
            max_text_length: 500_000,
            strategy_timeout_secs: 600,
            model_timeout_secs: 300,
            max_concurrency: 1,
            topic_concurrency: 1,
            narrow_by_contract_type: false,
            max_context_chars: 24_000,
            resolution_excerpt_chars: 4_000,
            chunker: ChunkerConfig {
                max_chunk_chars: 8_000,
                ..ChunkerConfig::default()
            },
            voting: VotingConfig {
                threshold: 0.5,
                ..VotingConfig::default()
            },
            validation: ValidationConfig::permissive(),
            retry: RetryConfig::lenient(),
            rag: RagConfig {
                top_k: 5,
                similarity_threshold: 0.05,
                ..RagConfig::default()
            },
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
