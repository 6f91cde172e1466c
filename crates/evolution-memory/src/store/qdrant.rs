//! Qdrant vector store over its REST API.

use super::{Distance, VectorStore};
use crate::{MemoryError, MemoryRecord, ScoredMemory, StoredMemory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Client for a Qdrant instance.
pub struct QdrantVectorStore {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

#[derive(Serialize, Deserialize)]
struct PointPayload {
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct SearchHit {
    id: serde_json::Value,
    score: f32,
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantVectorStore {
    /// Create a client for the Qdrant instance at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{collection}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<reqwest::Response, MemoryError> {
        builder
            .send()
            .await
            .map_err(|err| MemoryError::Store(format!("qdrant {action} failed: {err}")))
    }
}

async fn error_from(response: reqwest::Response, action: &str) -> MemoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    MemoryError::Store(format!("qdrant {action} error {status}: {body}"))
}

fn parse_point_id(value: &serde_json::Value) -> Result<Uuid, MemoryError> {
    value
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| MemoryError::Store(format!("unexpected point id: {value}")))
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<bool, MemoryError> {
        let url = self.collection_url(collection);
        let response = self
            .send(self.request(reqwest::Method::GET, url.clone()), "get collection")
            .await?;
        match response.status() {
            status if status.is_success() => {
                debug!("collection already present (collection={})", collection);
                return Ok(false);
            }
            StatusCode::NOT_FOUND => {}
            _ => return Err(error_from(response, "get collection").await),
        }

        let body = json!({ "vectors": { "size": dimension, "distance": distance.as_str() } });
        let response = self
            .send(
                self.request(reqwest::Method::PUT, url).json(&body),
                "create collection",
            )
            .await?;
        match response.status() {
            status if status.is_success() => {
                info!(
                    "created collection (collection={}, dimension={}, distance={})",
                    collection,
                    dimension,
                    distance.as_str()
                );
                Ok(true)
            }
            StatusCode::CONFLICT => Ok(false),
            _ => Err(error_from(response, "create collection").await),
        }
    }

    async fn upsert(&self, collection: &str, record: &MemoryRecord) -> Result<(), MemoryError> {
        let url = format!("{}/points?wait=true", self.collection_url(collection));
        let payload = PointPayload {
            content: record.content.clone(),
            created_at: record.created_at,
        };
        let body = json!({
            "points": [{
                "id": record.id.to_string(),
                "vector": record.embedding,
                "payload": payload,
            }]
        });
        let response = self
            .send(self.request(reqwest::Method::PUT, url).json(&body), "upsert")
            .await?;
        if !response.status().is_success() {
            return Err(error_from(response, "upsert").await);
        }
        debug!(
            "upserted point (collection={}, id={}, content_len={})",
            collection,
            record.id,
            record.content.len()
        );
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let url = format!("{}/points/search", self.collection_url(collection));
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&body), "search")
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            status if !status.is_success() => return Err(error_from(response, "search").await),
            _ => {}
        }
        let parsed: QdrantResponse<Vec<SearchHit>> = response
            .json()
            .await
            .map_err(|err| MemoryError::Store(format!("invalid qdrant search response: {err}")))?;

        let mut hits = Vec::with_capacity(parsed.result.len());
        for hit in parsed.result {
            let Some(payload) = hit.payload else {
                continue;
            };
            hits.push(ScoredMemory {
                memory: StoredMemory {
                    id: parse_point_id(&hit.id)?,
                    content: payload.content,
                    created_at: payload.created_at,
                },
                score: hit.score,
            });
        }
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize, MemoryError> {
        let url = format!("{}/points/count", self.collection_url(collection));
        let response = self
            .send(
                self.request(reqwest::Method::POST, url)
                    .json(&json!({ "exact": true })),
                "count",
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(0),
            status if !status.is_success() => return Err(error_from(response, "count").await),
            _ => {}
        }
        let parsed: QdrantResponse<CountResult> = response
            .json()
            .await
            .map_err(|err| MemoryError::Store(format!("invalid qdrant count response: {err}")))?;
        Ok(parsed.result.count)
    }
}
