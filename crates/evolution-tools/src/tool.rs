//! Tool trait definition and metadata spec.

use async_trait::async_trait;
use evolution_protocol::ToolError;
use serde_json::{Value, json};
use std::fmt::Debug;

/// Tool metadata spec for discovery and schema presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON schema for tool arguments.
    pub args_schema: Value,
}

/// Interface for executable tools.
///
/// Tools take a single text input and produce text output. Planners pass the
/// input as `{"input": "..."}`.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Return the tool name.
    fn name(&self) -> &str;
    /// Return the tool description.
    fn description(&self) -> &str;
    /// Describe what the `input` argument should contain.
    fn input_description(&self) -> &str {
        "Input for the tool"
    }

    /// Invoke the tool with its text input.
    async fn call(&self, input: &str) -> Result<String, ToolError>;

    /// Return the JSON schema for tool arguments.
    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": self.input_description(),
                }
            },
            "required": ["input"],
            "additionalProperties": false,
        })
    }

    /// Build a `ToolSpec` describing this tool.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            args_schema: self.args_schema(),
        }
    }
}

/// Extract the text input from planner-supplied arguments.
///
/// Accepts `{"input": "..."}`, a bare JSON string, or raw text that is not
/// valid JSON.
pub fn input_from_args(raw: &str) -> Result<String, ToolError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get("input") {
            Some(Value::String(input)) => Ok(input.clone()),
            Some(other) => Err(ToolError::InvalidInput(format!(
                "expected string input, got {other}"
            ))),
            None => Err(ToolError::InvalidInput(
                "missing required field: input".to_string(),
            )),
        },
        Ok(Value::String(input)) => Ok(input),
        Ok(other) => Err(ToolError::InvalidInput(format!(
            "expected object arguments, got {other}"
        ))),
        Err(_) => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::input_from_args;
    use evolution_protocol::ToolError;
    use pretty_assertions::assert_eq;

    #[test]
    fn input_is_read_from_object_arguments() {
        assert_eq!(input_from_args(r#"{"input":"ls -la"}"#).expect("input"), "ls -la");
        assert_eq!(input_from_args(r#""SELECT 1""#).expect("string"), "SELECT 1");
        assert_eq!(input_from_args("plain text").expect("raw"), "plain text");
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(matches!(
            input_from_args(r#"{"command":"ls"}"#),
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(
            input_from_args(r#"{"input":3}"#),
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(input_from_args("[1,2]"), Err(ToolError::InvalidInput(_))));
    }
}
