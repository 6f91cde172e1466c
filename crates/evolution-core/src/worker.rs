//! Worker side of background memory processing, run inside the child process.

use crate::background::{BackgroundError, MemoryJob};
use async_trait::async_trait;
use evolution_memory::{MemoryError, MemoryService};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Turns a completed exchange into standalone facts worth remembering.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, job: &MemoryJob) -> Result<Vec<String>, BackgroundError>;
}

/// Stores the whole exchange as one record.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimExtractor;

#[async_trait]
impl FactExtractor for VerbatimExtractor {
    async fn extract(&self, job: &MemoryJob) -> Result<Vec<String>, BackgroundError> {
        Ok(vec![format!(
            "User asked: {}\nAssistant answered: {}",
            job.user_input.trim(),
            job.agent_response.trim()
        )])
    }
}

/// Asks a chat model for a JSON array of short facts.
#[derive(Clone)]
pub struct LlmFactExtractor {
    base_url: String,
    api_key: String,
    model: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for LlmFactExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmFactExtractor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmFactExtractor {
    pub fn new(
        base_url: Option<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            model: model.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }
}

fn extraction_prompt(job: &MemoryJob) -> String {
    format!(
        "Extract the facts from this conversation that would be valuable to remember in \
         future conversations: details about the user, their systems, projects and \
         preferences.\n\nUSER:\n\"{}\"\n\nASSISTANT:\n\"{}\"\n\nReturn a JSON array of \
         strings, each one a short standalone fact. Return an empty array if nothing is \
         worth remembering. Return ONLY valid JSON, no other text.",
        job.user_input, job.agent_response
    )
}

/// Parse a JSON array of strings, tolerating text around the array.
pub fn parse_facts(text: &str) -> Vec<String> {
    let parsed = serde_json::from_str::<Vec<Value>>(text.trim()).ok().or_else(|| {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end < start {
            return None;
        }
        serde_json::from_str::<Vec<Value>>(&text[start..=end]).ok()
    });
    let Some(values) = parsed else {
        warn!("failed to parse extracted facts (text_len={})", text.len());
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(fact) => Some(fact),
            Value::Object(map) => map
                .get("fact")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .map(|fact| fact.trim().to_string())
        .filter(|fact| !fact.is_empty())
        .collect()
}

#[async_trait]
impl FactExtractor for LlmFactExtractor {
    async fn extract(&self, job: &MemoryJob) -> Result<Vec<String>, BackgroundError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You extract durable facts from conversations."},
                {"role": "user", "content": extraction_prompt(job)},
            ],
        });
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| BackgroundError::Extraction(format!("request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackgroundError::Extraction(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| BackgroundError::Extraction(format!("invalid response: {err}")))?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        let facts = parse_facts(text);
        debug!(
            "extracted facts (model={}, count={})",
            self.model,
            facts.len()
        );
        Ok(facts)
    }
}

/// Extracts facts from a job and saves each one.
pub struct MemoryWorker {
    extractor: Arc<dyn FactExtractor>,
    memory: Arc<MemoryService>,
}

impl MemoryWorker {
    pub fn new(extractor: Arc<dyn FactExtractor>, memory: Arc<MemoryService>) -> Self {
        Self { extractor, memory }
    }

    /// Process one job and return how many memories were stored.
    ///
    /// Facts rejected by the capture policy are skipped. Fails only when no
    /// fact could be stored because of an error.
    pub async fn process(&self, job: &MemoryJob) -> Result<usize, BackgroundError> {
        if job.agent_response.trim().is_empty() {
            return Ok(0);
        }
        let facts = self.extractor.extract(job).await?;
        let mut saved = 0usize;
        let mut last_error = None;
        for fact in &facts {
            match self.memory.save_memory(fact).await {
                Ok(id) => {
                    debug!("stored memory (id={}, content_len={})", id, fact.len());
                    saved += 1;
                }
                Err(MemoryError::Rejected) => debug!("memory rejected by capture policy"),
                Err(err) => {
                    warn!("failed to store memory (err={})", err);
                    last_error = Some(err);
                }
            }
        }
        info!(
            "processed memory job (facts={}, saved={})",
            facts.len(),
            saved
        );
        match last_error {
            Some(err) if saved == 0 => Err(BackgroundError::Memory(err.to_string())),
            _ => Ok(saved),
        }
    }
}
