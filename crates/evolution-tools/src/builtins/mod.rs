//! Built-in tools bundled with Evolution.

mod memory;
mod shell;
mod sql;

pub use memory::{RecallMemoryTool, SaveMemoryTool, render_recall};
pub use shell::ShellTool;
pub use sql::SqlTool;
