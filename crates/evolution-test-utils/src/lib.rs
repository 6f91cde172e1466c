//! Test helpers shared across Evolution crates.

pub mod embedding;
pub mod planner;
pub mod runner;
pub mod sink;
pub mod store;
pub mod tools;

pub use embedding::{FailingEmbedder, HashingEmbedder};
pub use planner::{FailingPlanner, PlanStep, ScriptedPlanner};
pub use runner::{FailingRunner, PanickingRunner, RecordingRunner, SlowRunner};
pub use sink::CollectingSink;
pub use store::UnavailableStore;
pub use tools::{EchoTool, FailingTool};
