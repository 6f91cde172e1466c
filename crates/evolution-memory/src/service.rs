//! Save and recall free-text memories by semantic similarity.

use crate::policy::{CaptureFilter, MemoryCapturePolicy};
use crate::store::{Distance, VectorStore};
use crate::{EmbeddingProvider, MemoryError, MemoryId, MemoryQueryResult, MemoryRecord, Recall};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Settings for a `MemoryService`.
#[derive(Debug, Clone)]
pub struct MemoryServiceConfig {
    /// Collection holding every memory.
    pub collection: String,
    /// Result count used when the caller does not pass a limit.
    pub recall_default: usize,
    /// Minimum similarity for a hit to be returned.
    pub score_threshold: Option<f32>,
    /// Capture policy applied before storage.
    pub capture: MemoryCapturePolicy,
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            collection: "memories".to_string(),
            recall_default: 5,
            score_threshold: None,
            capture: MemoryCapturePolicy::default(),
        }
    }
}

/// Memory facade over an embedding provider and a vector store.
///
/// Construction performs no I/O; the collection is created on first use.
pub struct MemoryService {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: MemoryServiceConfig,
    filter: CaptureFilter,
    collection_ready: OnceCell<()>,
}

impl MemoryService {
    /// Build a memory service, compiling its capture policy.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: MemoryServiceConfig,
    ) -> Result<Self, MemoryError> {
        let filter = CaptureFilter::new(config.capture.clone())?;
        Ok(Self {
            embedder,
            store,
            config,
            filter,
            collection_ready: OnceCell::new(),
        })
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Default recall limit.
    pub fn recall_default(&self) -> usize {
        self.config.recall_default
    }

    /// Create the collection if it does not exist yet. Safe to call repeatedly.
    pub async fn ensure_collection(&self) -> Result<(), MemoryError> {
        self.collection_ready
            .get_or_try_init(|| async {
                let created = self
                    .store
                    .ensure_collection(
                        &self.config.collection,
                        self.embedder.dimension(),
                        Distance::Cosine,
                    )
                    .await?;
                if created {
                    info!(
                        "memory collection created (collection={}, dimension={})",
                        self.config.collection,
                        self.embedder.dimension()
                    );
                }
                Ok::<(), MemoryError>(())
            })
            .await?;
        Ok(())
    }

    /// Store `content` as a new memory and return its id.
    pub async fn save_memory(&self, content: &str) -> Result<MemoryId, MemoryError> {
        let Some(content) = self.filter.apply(content) else {
            warn!(
                "memory rejected by capture policy (collection={})",
                self.config.collection
            );
            return Err(MemoryError::Rejected);
        };
        self.ensure_collection().await?;

        let embedding = self.embedder.embed(&content).await?;
        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(MemoryError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        let record = MemoryRecord::new(content, embedding);
        self.store.upsert(&self.config.collection, &record).await?;
        info!(
            "memory saved (collection={}, id={}, content_len={})",
            self.config.collection,
            record.id,
            record.content.len()
        );
        Ok(record.id)
    }

    /// Recall up to `limit` memories closest to `query` (default limit when `None`).
    pub async fn recall_memory(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Recall, MemoryError> {
        let limit = limit.unwrap_or(self.config.recall_default);
        if limit == 0 {
            return Ok(Recall::Empty);
        }
        let embedding = self.embedder.embed(query).await?;
        let mut hits = self
            .store
            .search(
                &self.config.collection,
                &embedding,
                limit,
                self.config.score_threshold,
            )
            .await?;
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        hits.truncate(limit);
        debug!(
            "memory recall (collection={}, query_len={}, hits={})",
            self.config.collection,
            query.len(),
            hits.len()
        );
        if hits.is_empty() {
            return Ok(Recall::Empty);
        }
        let results = hits
            .into_iter()
            .enumerate()
            .map(|(idx, hit)| MemoryQueryResult {
                record: hit.memory,
                score: hit.score.clamp(0.0, 1.0),
                rank: idx + 1,
            })
            .collect();
        Ok(Recall::Found(results))
    }
}
