//! Embedding and nearest-neighbour search infrastructure.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation, plus the model registry
//! - `index`: In-memory exact nearest-neighbour index (L2 or cosine)
//! - `storage`: Binary file I/O for embedding matrices and indexes

pub mod embeddings;
mod index;
mod storage;

pub use embeddings::{
    model_id_hash, Embedder, EmbedderLoader, EmbeddingError, EmbeddingMatrix, FastEmbedLoader,
    ModelSpec,
};
pub use index::{IndexError, Metric, Neighbor, VectorIndex};
pub use storage::{VectorStorage, VectorStorageError};
