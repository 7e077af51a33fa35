//! Chunk module - typed slices of document text

use serde::{Deserialize, Serialize};

/// Structural role of a chunk within a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Title block: contract number, name, parties summary
    Header,
    /// Party identification (甲方/乙方)
    Party,
    /// Price, payment, tax
    Financial,
    /// Dates, terms, milestones
    Schedule,
    /// A numbered article without a more specific role
    Article,
    /// Signature and seal block
    Signature,
    /// Unstructured remainder
    Other,
}

impl ChunkType {
    /// Get the chunk type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Header => "header",
            ChunkType::Party => "party",
            ChunkType::Financial => "financial",
            ChunkType::Schedule => "schedule",
            ChunkType::Article => "article",
            ChunkType::Signature => "signature",
            ChunkType::Other => "other",
        }
    }

    /// Parse a chunk type from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "header" => Some(ChunkType::Header),
            "party" => Some(ChunkType::Party),
            "financial" => Some(ChunkType::Financial),
            "schedule" => Some(ChunkType::Schedule),
            "article" => Some(ChunkType::Article),
            "signature" => Some(ChunkType::Signature),
            "other" => Some(ChunkType::Other),
            _ => None,
        }
    }

    /// Static ordering weight; higher means more useful as model context
    pub fn priority(&self) -> u8 {
        match self {
            ChunkType::Header => 10,
            ChunkType::Party => 9,
            ChunkType::Financial => 8,
            ChunkType::Schedule => 7,
            ChunkType::Signature => 5,
            ChunkType::Article => 4,
            ChunkType::Other => 1,
        }
    }

    /// Extraction fields a chunk of this type is expected to support
    pub fn field_relevance(&self) -> &'static [&'static str] {
        match self {
            ChunkType::Header => &["contractNo", "name", "customerName"],
            ChunkType::Party => &["customerName", "ourEntity"],
            ChunkType::Financial => &[
                "amountWithTax",
                "amountWithoutTax",
                "taxRate",
                "currency",
                "paymentMethod",
                "rateItems",
                "lineItems",
            ],
            ChunkType::Schedule => &["signDate", "startDate", "endDate", "duration", "milestones"],
            ChunkType::Article => &[
                "penaltyClause",
                "liabilityLimit",
                "terminationClause",
                "disputeResolution",
            ],
            ChunkType::Signature => &["signDate", "customerName", "ourEntity"],
            ChunkType::Other => &[],
        }
    }
}

/// A contiguous, typed, field-relevant slice of document text
///
/// Offsets are UTF-8 byte offsets into the chunked text, so
/// `&text[chunk.start_offset..chunk.end_offset] == chunk.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Positional identifier (`chunk-0`, `chunk-1`, ...)
    pub id: String,

    /// The chunk text
    pub text: String,

    /// Structural role
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    /// Inclusive start byte offset
    pub start_offset: usize,

    /// Exclusive end byte offset
    pub end_offset: usize,

    /// Context priority (see [`ChunkType::priority`])
    pub priority: u8,

    /// Extraction fields this chunk supports
    pub field_relevance: Vec<String>,
}

impl Chunk {
    /// Build a chunk over `source[start..end]`, annotated by type
    ///
    /// The caller guarantees `start < end <= source.len()` on char boundaries.
    pub fn new(index: usize, source: &str, start: usize, end: usize, chunk_type: ChunkType) -> Self {
        Self {
            id: format!("chunk-{}", index),
            text: source[start..end].to_string(),
            chunk_type,
            start_offset: start,
            end_offset: end,
            priority: chunk_type.priority(),
            field_relevance: chunk_type
                .field_relevance()
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    /// Length of the chunk in bytes
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Chunks are never empty by construction
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if this chunk supports any of the given fields
    pub fn is_relevant_to<S: AsRef<str>>(&self, field_names: &[S]) -> bool {
        field_names
            .iter()
            .any(|f| self.field_relevance.iter().any(|r| r == f.as_ref()))
    }
}
