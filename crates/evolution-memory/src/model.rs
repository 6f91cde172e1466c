//! Memory record models used by stores and the memory service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a stored memory.
pub type MemoryId = Uuid;

/// A memory together with its embedding, as written to a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: MemoryId,
    /// Free-text memory content.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a new record with a fresh id and the current timestamp.
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            embedding,
            created_at: Utc::now(),
        }
    }

    /// Drop the embedding, keeping the stored payload.
    pub fn stored(&self) -> StoredMemory {
        StoredMemory {
            id: self.id,
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

/// Payload of a stored memory, as returned by searches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMemory {
    pub id: MemoryId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Raw store hit before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub memory: StoredMemory,
    pub score: f32,
}

/// A ranked recall result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryQueryResult {
    /// Matching memory.
    pub record: StoredMemory,
    /// Cosine similarity clamped to [0, 1].
    pub score: f32,
    /// 1-based rank; 1 is the closest match.
    pub rank: usize,
}

/// Outcome of a recall query.
#[derive(Debug, Clone, PartialEq)]
pub enum Recall {
    /// At least one memory matched, ordered by descending score.
    Found(Vec<MemoryQueryResult>),
    /// No memory matched; this is not an error.
    Empty,
}

impl Recall {
    /// Results as a slice; empty for `Recall::Empty`.
    pub fn results(&self) -> &[MemoryQueryResult] {
        match self {
            Recall::Found(results) => results,
            Recall::Empty => &[],
        }
    }

    /// Whether no memory matched.
    pub fn is_empty(&self) -> bool {
        matches!(self, Recall::Empty)
    }
}
