//! SQLite-backed vector store with exact similarity search.

use super::{Distance, VectorStore};
use crate::embedding::cosine_similarity;
use crate::{MemoryError, MemoryRecord, ScoredMemory, StoredMemory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    distance TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS points (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(collection, id)
);
CREATE INDEX IF NOT EXISTS idx_points_collection ON points(collection, seq DESC);
";

/// Vector store persisted in a single SQLite file.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| MemoryError::Store(format!("create {}: {err}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("opened sqlite vector store (path={})", path.display());
        Self::init(conn)
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking SQLite work off the async runtime.
    async fn with_conn<T, F>(&self, work: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            work(&guard)
        })
        .await
        .map_err(|err| MemoryError::Store(format!("sqlite task failed: {err}")))?
    }
}

fn collection_params(
    conn: &Connection,
    collection: &str,
) -> Result<Option<(usize, Distance)>, MemoryError> {
    let row = conn
        .query_row(
            "SELECT dimension, distance FROM collections WHERE name = ?1",
            params![collection],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    Ok(row.map(|(dimension, distance)| (dimension as usize, Distance::parse(&distance))))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<bool, MemoryError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            if let Some((existing, _)) = collection_params(conn, &collection)? {
                if existing != dimension {
                    return Err(MemoryError::DimensionMismatch {
                        expected: existing,
                        actual: dimension,
                    });
                }
                debug!("collection already present (collection={})", collection);
                return Ok(false);
            }
            conn.execute(
                "INSERT OR IGNORE INTO collections (name, dimension, distance, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![collection, dimension as i64, distance.as_str(), Utc::now()],
            )?;
            info!(
                "created collection (collection={}, dimension={}, distance={})",
                collection,
                dimension,
                distance.as_str()
            );
            Ok(true)
        })
        .await
    }

    async fn upsert(&self, collection: &str, record: &MemoryRecord) -> Result<(), MemoryError> {
        let collection = collection.to_string();
        let record = record.clone();
        self.with_conn(move |conn| {
            let (dimension, _) = collection_params(conn, &collection)?.ok_or_else(|| {
                MemoryError::Store(format!("collection not found: {collection}"))
            })?;
            if record.embedding.len() != dimension {
                return Err(MemoryError::DimensionMismatch {
                    expected: dimension,
                    actual: record.embedding.len(),
                });
            }
            conn.execute(
                "INSERT INTO points (collection, id, content, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at",
                params![
                    collection,
                    record.id.to_string(),
                    record.content,
                    encode_vector(&record.embedding),
                    record.created_at
                ],
            )?;
            debug!(
                "upserted point (collection={}, id={}, content_len={})",
                collection,
                record.id,
                record.content.len()
            );
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let collection = collection.to_string();
        let query = vector.to_vec();
        self.with_conn(move |conn| {
            let Some((dimension, distance)) = collection_params(conn, &collection)? else {
                return Ok(Vec::new());
            };
            if query.len() != dimension {
                return Err(MemoryError::DimensionMismatch {
                    expected: dimension,
                    actual: query.len(),
                });
            }
            let mut stmt = conn.prepare(
                "SELECT seq, id, content, embedding, created_at FROM points WHERE collection = ?1",
            )?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (seq, id, content, embedding, created_at) = row?;
                let similarity = score(distance, &query, &decode_vector(&embedding));
                if score_threshold.is_some_and(|threshold| similarity < threshold) {
                    continue;
                }
                let id = Uuid::parse_str(&id)
                    .map_err(|err| MemoryError::Store(format!("invalid point id {id}: {err}")))?;
                hits.push((
                    seq,
                    ScoredMemory {
                        memory: StoredMemory {
                            id,
                            content,
                            created_at,
                        },
                        score: similarity,
                    },
                ));
            }
            hits.sort_by(|(seq_a, a), (seq_b, b)| {
                b.score.total_cmp(&a.score).then_with(|| seq_b.cmp(seq_a))
            });
            hits.truncate(limit);
            Ok(hits.into_iter().map(|(_, hit)| hit).collect())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<usize, MemoryError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM points WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::{SqliteVectorStore, decode_vector, encode_vector};
    use crate::store::{Distance, VectorStore};
    use crate::{MemoryError, MemoryRecord};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn vectors_survive_blob_encoding() {
        let vector = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&vector)), vector);
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let store = SqliteVectorStore::open_in_memory().expect("store");
        assert!(store.ensure_collection("m", 3, Distance::Cosine).await.expect("first"));
        assert!(!store.ensure_collection("m", 3, Distance::Cosine).await.expect("second"));
        let err = store
            .ensure_collection("m", 4, Distance::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    #[tokio::test]
    async fn search_orders_by_score_then_recency() {
        let store = SqliteVectorStore::open_in_memory().expect("store");
        store.ensure_collection("m", 2, Distance::Cosine).await.expect("collection");
        let older = MemoryRecord::new("older", vec![1.0, 0.0]);
        let newer = MemoryRecord::new("newer", vec![2.0, 0.0]);
        let other = MemoryRecord::new("other", vec![0.0, 1.0]);
        for record in [&older, &newer, &other] {
            store.upsert("m", record).await.expect("upsert");
        }

        let hits = store.search("m", &[1.0, 0.0], 10, None).await.expect("search");
        let contents: Vec<&str> = hits.iter().map(|hit| hit.memory.content.as_str()).collect();
        assert_eq!(contents, vec!["newer", "older", "other"]);

        let hits = store
            .search("m", &[1.0, 0.0], 10, Some(0.5))
            .await
            .expect("threshold");
        assert_eq!(hits.len(), 2);

        let hits = store.search("m", &[1.0, 0.0], 1, None).await.expect("limit");
        assert_eq!(hits[0].memory.id, newer.id);
    }

    #[tokio::test]
    async fn missing_collection_searches_empty() {
        let store = SqliteVectorStore::open_in_memory().expect("store");
        assert!(store.search("none", &[1.0], 5, None).await.expect("search").is_empty());
        assert_eq!(store.count("none").await.expect("count"), 0);
        let err = store
            .upsert("none", &MemoryRecord::new("x", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Store(_)));
    }

    #[tokio::test]
    async fn records_persist_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("memory.db");
        let record = MemoryRecord::new("persisted", vec![0.0, 1.0]);
        {
            let store = SqliteVectorStore::open(&path).expect("store");
            store.ensure_collection("m", 2, Distance::Cosine).await.expect("collection");
            store.upsert("m", &record).await.expect("upsert");
            store.upsert("m", &record).await.expect("upsert again");
        }
        let store = SqliteVectorStore::open(&path).expect("reopen");
        assert_eq!(store.count("m").await.expect("count"), 1);
        let hits = store.search("m", &[0.0, 1.0], 5, None).await.expect("search");
        assert_eq!(hits[0].memory, record.stored());
    }
}
