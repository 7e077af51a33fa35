//! Concord Extractor
//!
//! Pulls structured contract fields out of document text by running several
//! independent strategies and reconciling their answers.
//!
//! # Overview
//!
//! A contract is chunked once, then handed to every requested strategy:
//! regular expressions, a converted document with per-topic model calls,
//! retrieval over embedded chunks, and whole-document model calls. Their
//! partial answers are merged field by field by weighted vote, conflicts are
//! optionally settled (by the user or the model), and each topic is
//! validated, optionally with a correction loop.
//!
//! # Architecture
//!
//! ```text
//! Text → Chunker → StrategyManager ─┬─ pattern    ─┐
//!                                   ├─ converted  ─┤
//!                                   ├─ rag        ─┼→ VotingEngine → Gatekeeper → Outcome
//!                                   └─ model_only ─┘
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use concord_extractor::{ExtractionRequest, Extractor, ExtractorConfig};
//! use concord_llm::{MockProvider, ModelClient, ModelService};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let model: Arc<dyn ModelService> = Arc::new(ModelClient::new(MockProvider::new("{}")));
//! let extractor = Extractor::new(ExtractorConfig::default(), Some(model), None)?;
//!
//! let request = ExtractionRequest::new("合同编号：CT-001\n总价：人民币500,000元")
//!     .with_topics(["basic_info", "financial"])
//!     .with_validation_retry(true);
//! let outcome = extractor.extract(request).await?;
//!
//! println!("Fields: {:?}", outcome.fields);
//! println!("Completeness: {}", outcome.completeness.score);
//! println!("Conflicts: {}", outcome.conflicts().len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod chunking;
mod config;
mod converter;
mod error;
mod extractor;
pub mod manager;
mod parser;
pub mod patterns;
mod prompt;
pub mod strategy;
pub mod tables;
mod types;
pub mod voting;


pub use chunking::{Chunker, ChunkerConfig};
pub use config::{ExtractorConfig, RagConfig};
pub use converter::{ConverterClient, DoclingConverter, SharedConverter};
pub use error::ExtractorError;
pub use extractor::Extractor;
pub use manager::{ManagerReport, SkippedStrategy, StrategyManager};
pub use strategy::{
    ConvertedStrategy, ModelOnlyStrategy, PatternStrategy, RagStrategy, Strategy, StrategyOptions,
};
pub use types::{ContractType, ExtractionOutcome, ExtractionRequest, Resolution};
pub use voting::{StrategyWeight, VotingConfig, VotingEngine};
