//! Agents, their capability sets, and sub-agents exposed as tools.

use crate::planner::{
    CapabilityInvoker, EventStream, HostedCapability, PlanRequest, Planner,
};
use crate::types::Turn;
use async_trait::async_trait;
use evolution_protocol::{StreamEvent, ToolError};
use evolution_tools::{Tool, ToolRegistry, ToolSpec, input_from_args};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;

/// Fixed set of capabilities an agent may use.
#[derive(Clone, Default)]
pub struct Capabilities {
    tools: ToolRegistry,
    hosted: Vec<HostedCapability>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("tools", &self.tools.list())
            .field("hosted", &self.hosted)
            .finish()
    }
}

impl Capabilities {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            hosted: Vec::new(),
        }
    }

    /// Add a hosted capability rendered by the planner.
    pub fn with_hosted(mut self, hosted: HostedCapability) -> Self {
        if !self.hosted.contains(&hosted) {
            self.hosted.push(hosted);
        }
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn hosted(&self) -> &[HostedCapability] {
        &self.hosted
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.specs()
    }

    /// Run a named tool with planner-supplied arguments.
    ///
    /// Unknown tools and tool failures come back as `Error: ...` text.
    pub async fn invoke(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!("planner requested unknown tool (tool={})", name);
            return format!("Error: unknown tool '{name}'");
        };
        let input = match input_from_args(arguments) {
            Ok(input) => input,
            Err(err) => return format!("Error: {err}"),
        };
        match tool.call(&input).await {
            Ok(output) => {
                debug!(
                    "tool call succeeded (tool={}, output_len={})",
                    name,
                    output.len()
                );
                output
            }
            Err(err) => {
                warn!("tool call failed (tool={}, err={})", name, err);
                format!("Error: {err}")
            }
        }
    }
}

#[async_trait]
impl CapabilityInvoker for Capabilities {
    async fn invoke(&self, name: &str, arguments: &str) -> String {
        Capabilities::invoke(self, name, arguments).await
    }
}

/// A named agent: instructions, capabilities and the planner that drives it.
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    capabilities: Capabilities,
    planner: Arc<dyn Planner>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        capabilities: Capabilities,
        planner: Arc<dyn Planner>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            capabilities,
            planner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Start a turn with an explicit invoker.
    pub fn plan(
        &self,
        history: Vec<Turn>,
        input: impl Into<String>,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> EventStream {
        self.planner.decide(PlanRequest {
            instructions: self.instructions.clone(),
            tools: self.capabilities.tool_specs(),
            hosted: self.capabilities.hosted().to_vec(),
            history,
            input: input.into(),
            invoker,
        })
    }
}

/// Exposes an agent as a tool so another agent can delegate to it.
#[derive(Debug, Clone)]
pub struct AgentTool {
    agent: Agent,
    description: String,
}

impl AgentTool {
    pub fn new(agent: Agent, description: impl Into<String>) -> Self {
        Self {
            agent,
            description: description.into(),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_description(&self) -> &str {
        "The task for the agent, with all context it needs"
    }

    /// Runs the agent with no history and returns its concatenated answer.
    async fn call(&self, input: &str) -> Result<String, ToolError> {
        info!(
            "delegating to sub-agent (agent={}, input_len={})",
            self.agent.name(),
            input.len()
        );
        let invoker: Arc<dyn CapabilityInvoker> = Arc::new(self.agent.capabilities().clone());
        let mut stream = self.agent.plan(Vec::new(), input, invoker);
        let mut answer = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::AnswerDelta(text)) => answer.push_str(&text),
                Ok(_) => {}
                Err(err) => {
                    return Err(ToolError::ExecutionFailed(format!(
                        "agent {} failed: {err}",
                        self.agent.name()
                    )));
                }
            }
        }
        debug!(
            "sub-agent finished (agent={}, answer_len={})",
            self.agent.name(),
            answer.len()
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::Capabilities;
    use async_trait::async_trait;
    use evolution_protocol::ToolError;
    use evolution_tools::{Tool, ToolRegistry};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "uppercase"
        }

        async fn call(&self, input: &str) -> Result<String, ToolError> {
            if input.is_empty() {
                return Err(ToolError::InvalidInput("empty".to_string()));
            }
            Ok(input.to_uppercase())
        }
    }

    fn capabilities() -> Capabilities {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Upper));
        Capabilities::new(registry)
    }

    #[tokio::test]
    async fn invokes_tools_with_json_arguments() {
        let output = capabilities().invoke("upper", r#"{"input":"abc"}"#).await;
        assert_eq!(output, "ABC");
    }

    #[tokio::test]
    async fn failures_are_rendered_as_text() {
        let caps = capabilities();
        assert_eq!(
            caps.invoke("missing", "{}").await,
            "Error: unknown tool 'missing'"
        );
        assert!(caps.invoke("upper", r#"{"input":""}"#).await.starts_with("Error: "));
        assert!(caps.invoke("upper", r#"{"other":1}"#).await.starts_with("Error: "));
    }
}
