//! Tooling interfaces and built-in tools for Evolution.

pub mod builtins;
pub mod registry;
pub mod tool;

/// Built-in tools.
pub use builtins::{RecallMemoryTool, SaveMemoryTool, ShellTool, SqlTool};
/// Tool registry type.
pub use registry::ToolRegistry;
/// Tool trait, spec type, and argument helpers.
pub use tool::{Tool, ToolSpec, input_from_args};
