//! Concord Domain Layer
//!
//! This crate contains the core data model for Concord's contract field
//! extraction. It defines the value objects shared by every other layer and
//! the trait interfaces for the external services extraction depends on.
//!
//! ## Key Concepts
//!
//! - **Chunk**: A contiguous, typed slice of document text
//! - **Topic**: A weighted group of related extraction fields
//! - **Strategy Result**: One strategy's partial field set with self-reported scores
//! - **Vote Result**: The agreed value for one field across strategies
//! - **Validation Result**: Plausibility errors and warnings with a quality score
//!
//! ## Architecture
//!
//! This crate follows Clean Architecture:
//! - Pure data model and scoring logic only
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod extraction_id;
pub mod strategy;
pub mod topic;
pub mod traits;
pub mod validation;
pub mod value;
pub mod vote;

// Re-exports for convenience
pub use chunk::{Chunk, ChunkType};
pub use extraction_id::ExtractionId;
pub use strategy::StrategyResult;
pub use topic::{
    CompletenessScoreBreakdown, FieldDefinition, FieldType, RegistryError, TopicDefinition,
    TopicRegistry, TopicScore,
};
pub use validation::{ValidationIssue, ValidationResult};
pub use value::{is_filled, is_placeholder, FieldMap};
pub use vote::{ResolutionMethod, Vote, VoteResult};
