//! Tools exposing the memory service to planners.

use crate::Tool;
use async_trait::async_trait;
use evolution_memory::{MemoryError, MemoryService, Recall};
use evolution_protocol::ToolError;
use log::warn;
use std::sync::Arc;

/// Text returned when a recall finds nothing.
pub const NO_MEMORIES: &str = "No relevant memories found.";

/// Render a recall outcome as planner-readable text.
pub fn render_recall(recall: &Recall) -> String {
    match recall {
        Recall::Empty => NO_MEMORIES.to_string(),
        Recall::Found(results) => {
            let mut output = format!("Found {} relevant memories:", results.len());
            for result in results {
                output.push_str(&format!(
                    "\n{}. [score {:.3}] {} (saved {})",
                    result.rank,
                    result.score,
                    result.record.content,
                    result.record.created_at.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            output
        }
    }
}

/// Looks up stored memories by semantic similarity.
#[derive(Clone)]
pub struct RecallMemoryTool {
    service: Arc<MemoryService>,
    limit: Option<usize>,
}

impl std::fmt::Debug for RecallMemoryTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallMemoryTool")
            .field("collection", &self.service.collection())
            .field("limit", &self.limit)
            .finish()
    }
}

impl RecallMemoryTool {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self {
            service,
            limit: None,
        }
    }

    /// Override the service's default result count.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn description(&self) -> &str {
        "Search long-term memory for facts learned in earlier conversations"
    }

    fn input_description(&self) -> &str {
        "What to look up, phrased as a natural-language query"
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        match self.service.recall_memory(input, self.limit).await {
            Ok(recall) => Ok(render_recall(&recall)),
            Err(err) => {
                warn!("memory recall failed (err={})", err);
                Ok(format!("Memory recall is unavailable right now: {err}"))
            }
        }
    }
}

/// Stores a fact in long-term memory.
#[derive(Clone)]
pub struct SaveMemoryTool {
    service: Arc<MemoryService>,
}

impl std::fmt::Debug for SaveMemoryTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveMemoryTool")
            .field("collection", &self.service.collection())
            .finish()
    }
}

impl SaveMemoryTool {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Store a short standalone fact in long-term memory"
    }

    fn input_description(&self) -> &str {
        "The fact to remember"
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        match self.service.save_memory(input).await {
            Ok(id) => Ok(format!("Memory saved (id={id}).")),
            Err(MemoryError::Rejected) => {
                Ok("Memory not saved: content is blocked by the capture policy.".to_string())
            }
            Err(err) => {
                warn!("memory save failed (err={})", err);
                Ok(format!("Failed to save memory: {err}"))
            }
        }
    }
}
