//! Error types for memory operations.

/// Errors returned by embedding providers, vector stores, and the memory service.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Embedding provider failed or returned an unusable response.
    #[error("embedding error: {0}")]
    Embedding(String),
    /// Vector store operation failed.
    #[error("vector store error: {0}")]
    Store(String),
    /// Embedding length does not match the collection dimension.
    #[error("embedding dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Content was rejected by the capture policy.
    #[error("content rejected by capture policy")]
    Rejected,
    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::Store(err.to_string())
    }
}
