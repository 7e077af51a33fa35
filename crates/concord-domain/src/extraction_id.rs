//! Extraction identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for one orchestrated extraction, based on UUIDv7
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ExtractionId(u128);

impl ExtractionId {
    /// Generate a new UUIDv7-based ExtractionId
    ///
    /// # Examples
    ///
    /// ```
    /// use concord_domain::ExtractionId;
    ///
    /// let id = ExtractionId::new();
    /// assert!(id.value() > 0);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Parse an ExtractionId from its UUID string form
    ///
    /// # Examples
    ///
    /// ```
    /// use concord_domain::ExtractionId;
    ///
    /// let id = ExtractionId::new();
    /// let parsed = ExtractionId::from_string(&id.to_string()).unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid UUIDv7 string: {}", e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Milliseconds since the Unix epoch at which the id was generated
    pub fn timestamp_ms(&self) -> u64 {
        // UUIDv7: top 48 bits are the Unix millisecond timestamp
        (self.0 >> 80) as u64
    }
}

impl Default for ExtractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExtractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

impl From<ExtractionId> for String {
    fn from(id: ExtractionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ExtractionId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let first = ExtractionId::new();
        let second = ExtractionId::new();
        assert_ne!(first, second);
        assert!(first.timestamp_ms() <= second.timestamp_ms());
    }

    #[test]
    fn test_invalid_string_is_rejected() {
        assert!(ExtractionId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let id = ExtractionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ExtractionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
