use async_trait::async_trait;
use evolution_protocol::ToolError;
use evolution_tools::Tool;
use parking_lot::Mutex;
use std::sync::Arc;

/// Tool that returns its input with a prefix and records each call.
#[derive(Debug, Clone)]
pub struct EchoTool {
    name: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "echo"
    }

    async fn call(&self, input: &str) -> Result<String, ToolError> {
        self.calls.lock().push(input.to_string());
        Ok(format!("echo: {input}"))
    }
}

/// Tool whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn call(&self, _input: &str) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed("tool exploded".to_string()))
    }
}
