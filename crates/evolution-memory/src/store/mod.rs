//! Vector store interface and backends.

mod qdrant;
mod sqlite;

pub use qdrant::QdrantVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::{MemoryError, MemoryRecord, ScoredMemory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Similarity metric for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    /// Cosine similarity.
    Cosine,
    /// Raw dot product.
    Dot,
}

impl Distance {
    /// Name used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
        }
    }

    /// Parse a stored distance name; unknown values map to cosine.
    pub fn parse(value: &str) -> Self {
        match value {
            "Dot" => Distance::Dot,
            _ => Distance::Cosine,
        }
    }
}

/// Storage for embedded memories grouped in named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Returns `true` when it was created.
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<bool, MemoryError>;
    /// Insert or replace a record by id.
    async fn upsert(&self, collection: &str, record: &MemoryRecord) -> Result<(), MemoryError>;
    /// Nearest neighbours of `vector`, best first. A missing collection yields no hits.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, MemoryError>;
    /// Number of records in the collection; zero when it does not exist.
    async fn count(&self, collection: &str) -> Result<usize, MemoryError>;
}
