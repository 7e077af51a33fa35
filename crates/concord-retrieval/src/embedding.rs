//! Embedding Model for Text Vectorization
//!
//! This module provides text-to-vector conversion for similarity search.
//! Embeddings are computed locally so retrieval works without network access
//! or model downloads.
//!
//! # Architecture
//!
//! - **EmbeddingModel**: the trait retrieval code depends on
//! - **NgramEmbeddingModel**: hashed character unigrams and bigrams,
//!   deterministic and language-agnostic (works for CJK text, which has no
//!   word boundaries)
//!
//! # Examples
//!
//! ```rust
//! use concord_retrieval::embedding::{NgramEmbeddingModel, EmbeddingModel};
//!
//! let model = NgramEmbeddingModel::new(256);
//! let embedding = model.embed("付款方式：银行转账").unwrap();
//! assert_eq!(embedding.len(), 256);
//!
//! // Same text always produces same embedding
//! assert_eq!(embedding, model.embed("付款方式：银行转账").unwrap());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during embedding generation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Model not loaded
    #[error("Embedding model not loaded")]
    ModelNotLoaded,

    /// Invalid input text
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model inference error
    #[error("Model inference failed: {0}")]
    InferenceFailed(String),
}

/// Trait for embedding models
pub trait EmbeddingModel: Send + Sync {
    /// Generate an embedding vector for the given text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts; fails on the first text that fails
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Get the dimension of embeddings produced by this model
    fn dimension(&self) -> usize;
}

/// Hashed character n-gram embedding
///
/// Each alphanumeric character and each adjacent pair of them is hashed into
/// one of `dimension` buckets; bucket counts are normalized to unit length.
/// The embeddings are:
///
/// - **Deterministic**: Same text always produces same embedding
/// - **Normalized**: All vectors have unit length (for cosine similarity)
/// - **Non-negative**: Texts sharing characters have positive similarity
pub struct NgramEmbeddingModel {
    dimension: usize,
}

impl NgramEmbeddingModel {
    /// Create a new n-gram embedding model
    ///
    /// # Parameters
    ///
    /// - `dimension`: Number of hash buckets (at least 1)
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, gram: &[char]) -> usize {
        let mut hasher = DefaultHasher::new();
        gram.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Default for NgramEmbeddingModel {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingModel for NgramEmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        if chars.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Empty text cannot be embedded".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for c in &chars {
            embedding[self.bucket(std::slice::from_ref(c))] += 1.0;
        }
        for pair in chars.windows(2) {
            // Bigrams carry more signal than single characters
            embedding[self.bucket(pair)] += 2.0;
        }

        // Normalize to unit length for cosine similarity
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Calculate cosine similarity between two embedding vectors
///
/// Returns a value in [-1, 1]; 0.0 when either vector is zero or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_embedding_deterministic() {
        let model = NgramEmbeddingModel::new(384);
        let text = "甲方：北京某某科技有限公司";
        assert_eq!(model.embed(text).unwrap(), model.embed(text).unwrap());
    }

    #[test]
    fn test_embedding_dimension() {
        let model = NgramEmbeddingModel::new(128);
        assert_eq!(model.embed("test").unwrap().len(), 128);
        assert_eq!(model.dimension(), 128);
    }

    #[test]
    fn test_embedding_normalized() {
        let model = NgramEmbeddingModel::default();
        let embedding = model.embed("test text").unwrap();
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.0001, "Embedding should be normalized");
    }

    #[test]
    fn test_empty_and_punctuation_only_text() {
        let model = NgramEmbeddingModel::default();
        assert!(model.embed("").is_err());
        let err = model.embed("  ：，。 ").unwrap_err();
        assert!(err.to_string().contains("Empty text"));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let model = NgramEmbeddingModel::new(512);
        let query = model.embed("付款 金额 总价").unwrap();
        let financial = model.embed("合同总价为人民币50万元，付款方式为银行转账").unwrap();
        let dispute = model.embed("争议解决：提交仲裁委员会仲裁").unwrap();

        let a = cosine_similarity(&query, &financial);
        let b = cosine_similarity(&query, &dispute);
        assert!(a > b, "expected {a} > {b}");
    }

    #[test]
    fn test_embed_batch() {
        let model = NgramEmbeddingModel::new(64);
        let batch = model.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(model.embed_batch(&["a", ""]).is_err());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let vec = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&vec, &vec) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_similarity_is_non_negative(a in "[a-z0-9]{1,40}", b in "[a-z0-9]{1,40}") {
            let model = NgramEmbeddingModel::new(64);
            let sim = cosine_similarity(&model.embed(&a).unwrap(), &model.embed(&b).unwrap());
            prop_assert!(sim >= -1e-6);
            prop_assert!(sim <= 1.0 + 1e-6);
        }
    }
}
