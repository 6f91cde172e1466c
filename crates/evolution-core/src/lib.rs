//! Session-aware orchestration core for Evolution: sessions, streaming,
//! agents, planners and background memory processing.

pub mod agent;
pub mod background;
pub mod bootstrap;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod sessions;
pub mod state;
pub mod types;
pub mod worker;

pub use agent::{Agent, AgentTool, Capabilities};
pub use background::{
    BackgroundError, BackgroundMemoryProcessor, Dispatch, MEMORY_WORKER_COMMAND, MemoryJob,
    MemoryJobRunner, ProcessJobRunner,
};
pub use error::CoreError;
pub use orchestrator::{Orchestrator, RunResult, RunStream};
pub use pipeline::{PipelineError, StreamDemux, consume};
pub use planner::{
    CapabilityInvoker, EventStream, HostedCapability, OpenAiPlanner, OpenAiPlannerConfig,
    PlanRequest, Planner, PlannerError,
};
pub use sessions::SessionStore;
pub use state::{SqliteStateStore, StateError, StateStore};
pub use types::{Session, SessionSummary, Turn};
pub use worker::{FactExtractor, LlmFactExtractor, MemoryWorker, VerbatimExtractor};
