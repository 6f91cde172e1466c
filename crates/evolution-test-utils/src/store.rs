use async_trait::async_trait;
use evolution_memory::{Distance, MemoryError, MemoryRecord, ScoredMemory, VectorStore};

/// Vector store that is never reachable.
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore;

fn unavailable() -> MemoryError {
    MemoryError::Store("vector store unavailable".to_string())
}

#[async_trait]
impl VectorStore for UnavailableStore {
    async fn ensure_collection(
        &self,
        _collection: &str,
        _dimension: usize,
        _distance: Distance,
    ) -> Result<bool, MemoryError> {
        Err(unavailable())
    }

    async fn upsert(&self, _collection: &str, _record: &MemoryRecord) -> Result<(), MemoryError> {
        Err(unavailable())
    }

    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        _limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        Err(unavailable())
    }

    async fn count(&self, _collection: &str) -> Result<usize, MemoryError> {
        Err(unavailable())
    }
}
