//! HNSW Vector Index for Similarity Search
//!
//! This module provides a wrapper around the HNSW algorithm for
//! nearest-neighbor search over chunk embeddings.
//!
//! # HNSW Parameters
//!
//! - **M**: Number of bi-directional links per node (default: 16)
//!   Higher M = better accuracy but more memory
//! - **efConstruction**: Size of dynamic candidate list during construction (default: 200)
//!   Higher efConstruction = better index quality but slower build
//! - **efSearch**: Size of dynamic candidate list during search (default: 64)
//!   Higher efSearch = better recall but slower queries

use hnsw_rs::prelude::*;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const DEFAULT_M: usize = 16;
const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_EF_SEARCH: usize = 64;
const DEFAULT_MAX_ELEMENTS: usize = 10_000;

/// Errors that can occur during vector index operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorIndexError {
    /// Invalid embedding dimension
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        actual: usize,
    },

    /// Id inserted twice
    #[error("Duplicate id: {0}")]
    DuplicateId(usize),
}

/// A wrapper around HNSW for vector similarity search
///
/// Stores `(id, embedding)` pairs where the id is caller-defined (typically
/// the position of a chunk in its chunk list).
pub struct VectorIndex {
    dimension: usize,
    max_elements: usize,
    hnsw: Mutex<Hnsw<'static, f32, DistCosine>>,
    ids: Mutex<HashSet<usize>>,
}

fn build_hnsw(max_elements: usize) -> Hnsw<'static, f32, DistCosine> {
    // Calculate number of layers based on expected data size
    let nb_layer = 16.min((max_elements.max(2) as f32).ln().trunc() as usize).max(1);
    Hnsw::<'static, f32, DistCosine>::new(
        DEFAULT_M,
        max_elements,
        nb_layer,
        DEFAULT_EF_CONSTRUCTION,
        DistCosine {},
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VectorIndex {
    /// Create a new vector index with the specified dimension
    pub fn new(dimension: usize) -> Self {
        Self::with_capacity(dimension, DEFAULT_MAX_ELEMENTS)
    }

    /// Create an index sized for about `max_elements` vectors
    pub fn with_capacity(dimension: usize, max_elements: usize) -> Self {
        let max_elements = max_elements.max(1);
        Self {
            dimension,
            max_elements,
            hnsw: Mutex::new(build_hnsw(max_elements)),
            ids: Mutex::new(HashSet::new()),
        }
    }

    /// Embedding dimension this index accepts
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add an embedding under `id`
    pub fn add(&self, id: usize, embedding: &[f32]) -> Result<(), VectorIndexError> {
        self.check_dimension(embedding)?;

        if !lock(&self.ids).insert(id) {
            return Err(VectorIndexError::DuplicateId(id));
        }

        // Insert into HNSW (convert slice to owned Vec for 'static lifetime)
        let embedding_vec = embedding.to_vec();
        lock(&self.hnsw).insert((&embedding_vec, id));
        Ok(())
    }

    /// Search for the `k` nearest neighbors with similarity at least `threshold`
    ///
    /// Returns `(id, similarity)` pairs sorted by similarity, descending.
    /// Similarity is cosine similarity (`1 - cosine distance`).
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(usize, f32)>, VectorIndexError> {
        self.check_dimension(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let ef_search = DEFAULT_EF_SEARCH.max(k);
        let neighbours = lock(&self.hnsw).search(query, k, ef_search);

        let mut results: Vec<(usize, f32)> = neighbours
            .into_iter()
            .map(|neighbour| (neighbour.d_id, 1.0 - neighbour.distance))
            .filter(|(_, similarity)| similarity.is_finite() && *similarity >= threshold)
            .collect();
        results.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(results)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all vectors from the index
    pub fn clear(&self) {
        *lock(&self.hnsw) = build_hnsw(self.max_elements);
        lock(&self.ids).clear();
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), VectorIndexError> {
        if embedding.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_index_creation() {
        let index = VectorIndex::new(384);
        assert_eq!(index.dimension(), 384);
        assert!(index.is_empty());
    }

    #[test]
    fn test_add_and_search() {
        let index = VectorIndex::new(384);

        let embedding1: Vec<f32> = (0..384).map(|i| (i as f32 + 1.0) / 384.0).collect();
        index.add(7, &embedding1).unwrap();

        let mut embedding2 = embedding1.clone();
        embedding2[0] = 0.5;
        embedding2[1] = -0.5;
        index.add(8, &embedding2).unwrap();

        assert_eq!(index.len(), 2);

        let results = index.search(&embedding1, 2, 0.0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 7);
        assert!(results[0].1 > 0.99);
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = VectorIndex::new(384);
        let result = index.add(0, &[0.1; 128]);
        assert!(matches!(result, Err(VectorIndexError::DimensionMismatch { .. })));
        assert!(index.search(&[0.1; 3], 1, 0.0).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let index = VectorIndex::new(2);
        index.add(1, &[1.0, 0.0]).unwrap();
        assert_eq!(index.add(1, &[0.0, 1.0]), Err(VectorIndexError::DuplicateId(1)));
    }

    #[test]
    fn test_clear() {
        let index = VectorIndex::new(3);
        index.add(0, &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.len(), 1);

        index.clear();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 1, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_threshold_filters_and_orders() {
        let index = VectorIndex::new(3);
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0]).unwrap();
        index.add(3, &[0.7071, 0.7071, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 3, 0.5).unwrap();
        let ids: Vec<usize> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(results[1].1 > 0.5);
    }
}
