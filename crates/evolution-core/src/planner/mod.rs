//! Planner seam: the oracle that turns history and input into a stream of events.

mod openai;
mod sse;

pub use openai::{OpenAiPlanner, OpenAiPlannerConfig};
pub use sse::SseDecoder;

use crate::types::Turn;
use async_trait::async_trait;
use evolution_protocol::StreamEvent;
use evolution_tools::ToolSpec;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Stream of planner events for a single turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, PlannerError>> + Send>>;

/// Errors surfaced on a planner stream.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("http error: {0}")]
    Http(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("tool round limit reached ({0})")]
    ToolRoundLimit(usize),
}

/// Capabilities provided by the planner's host rather than by local tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedCapability {
    WebSearch,
}

/// Executes capabilities on behalf of a planner mid-turn.
///
/// Never fails: problems are rendered into the returned text.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(&self, name: &str, arguments: &str) -> String;
}

/// Everything a planner needs to produce one turn.
#[derive(Clone)]
pub struct PlanRequest {
    /// System instructions for the agent.
    pub instructions: String,
    /// Local tools the planner may call.
    pub tools: Vec<ToolSpec>,
    /// Hosted capabilities the planner may enable.
    pub hosted: Vec<HostedCapability>,
    /// Prior turns, oldest first, excluding `input`.
    pub history: Vec<Turn>,
    /// The new user input.
    pub input: String,
    pub invoker: Arc<dyn CapabilityInvoker>,
}

impl std::fmt::Debug for PlanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRequest")
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("hosted", &self.hosted)
            .field("history_len", &self.history.len())
            .field("input_len", &self.input.len())
            .finish()
    }
}

/// Opaque decision oracle behind an agent.
pub trait Planner: Send + Sync {
    /// Start producing events for `request`. Dropping the stream cancels the turn.
    fn decide(&self, request: PlanRequest) -> EventStream;
}
