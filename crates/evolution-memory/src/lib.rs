//! Semantic memory for Evolution: embeddings, vector stores, and recall.

pub mod embedding;
pub mod error;
pub mod model;
pub mod policy;
pub mod service;
pub mod store;

/// Embedding provider interface and OpenAI implementation.
pub use embedding::{EmbeddingProvider, OpenAiEmbeddings, cosine_similarity};
/// Memory error type.
pub use error::MemoryError;
/// Memory record models.
pub use model::{MemoryId, MemoryQueryResult, MemoryRecord, Recall, ScoredMemory, StoredMemory};
/// Capture policy applied before storage.
pub use policy::{CaptureFilter, MemoryCapturePolicy};
/// High-level save/recall service.
pub use service::{MemoryService, MemoryServiceConfig};
/// Vector store interface and implementations.
pub use store::{Distance, QdrantVectorStore, SqliteVectorStore, VectorStore};
