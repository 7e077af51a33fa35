//! Concord Gatekeeper
//!
//! Quality control for extracted contract fields.
//!
//! The Gatekeeper provides:
//! - Topic-specific plausibility rules (names, amounts, dates, schedules)
//! - Quality scoring of a topic's fields
//! - A bounded validate-and-correct loop that asks the model to fix
//!   low-scoring results
//!
//! # Examples
//!
//! ```
//! use concord_gatekeeper::{Gatekeeper, ValidationConfig};
//! use concord_domain::FieldMap;
//! use serde_json::json;
//!
//! let gatekeeper = Gatekeeper::new(ValidationConfig::default());
//! let mut fields = FieldMap::new();
//! fields.insert("amountWithTax".into(), json!("500000"));
//! fields.insert("taxRate".into(), json!("6%"));
//!
//! let result = gatekeeper.validate(&fields, "financial", None);
//! assert!(!result.is_valid);
//! assert_eq!(result.score, 80);
//! ```

#![warn(missing_docs)]

mod abort;
mod config;
mod error;
pub mod numeric;
mod retry;
mod validator;

pub use abort::{AbortHandle, AbortSignal};
pub use config::{RetryConfig, ValidationConfig};
pub use error::GatekeeperError;
pub use retry::{RetryAttempt, RetryLoop, RetryOutcome};
pub use validator::Gatekeeper;
