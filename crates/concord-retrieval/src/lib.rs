//! Concord Retrieval Layer
//!
//! Embedding and similarity search used by retrieval-augmented extraction.
//!
//! # Architecture
//!
//! - **EmbeddingModel**: text-to-vector trait, with a deterministic
//!   character n-gram implementation that needs no model files
//! - **VectorIndex**: in-memory HNSW index over chunk embeddings
//!
//! An index is built per document and discarded after the extraction.
//!
//! # Examples
//!
//! ```
//! use concord_retrieval::{EmbeddingModel, NgramEmbeddingModel, VectorIndex};
//!
//! let model = NgramEmbeddingModel::new(256);
//! let index = VectorIndex::new(model.dimension());
//! index.add(0, &model.embed("合同总价：人民币500,000元").unwrap()).unwrap();
//! index.add(1, &model.embed("争议解决：提交仲裁委员会仲裁").unwrap()).unwrap();
//!
//! let query = model.embed("合同总价 金额").unwrap();
//! let hits = index.search(&query, 1, 0.0).unwrap();
//! assert_eq!(hits[0].0, 0);
//! ```

#![warn(missing_docs)]

pub mod embedding;
pub mod vector_index;

pub use embedding::{cosine_similarity, EmbeddingError, EmbeddingModel, NgramEmbeddingModel};
pub use vector_index::{VectorIndex, VectorIndexError};
