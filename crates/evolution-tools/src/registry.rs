//! Registry for tool implementations.

use crate::tool::{Tool, ToolSpec};
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory registry for tool implementations, ordered by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    /// Map of tool name to implementation.
    tools: Arc<RwLock<BTreeMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool by name, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        debug!("registering tool (name={})", tool.name());
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// Fetch a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// List all registered tool names.
    pub fn list(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Return all registered tool instances.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().values().cloned().collect()
    }

    /// Return tool specs for all registered tools.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.read().values().map(|tool| tool.spec()).collect()
    }

    /// Build a registry holding only the named tools that exist here.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let subset = ToolRegistry::new();
        for name in names {
            match self.get(name.as_ref()) {
                Some(tool) => subset.register(tool),
                None => debug!("skipping unknown tool (name={})", name.as_ref()),
            }
        }
        subset
    }
}

#[cfg(test)]
mod tests {
    use super::ToolRegistry;
    use crate::Tool;
    use async_trait::async_trait;
    use evolution_protocol::ToolError;
    use pretty_assertions::assert_eq;
    use std::fmt;
    use std::sync::Arc;

    #[derive(Clone)]
    struct DummyTool {
        name: &'static str,
    }

    impl fmt::Debug for DummyTool {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "DummyTool({})", self.name)
        }
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "dummy"
        }

        async fn call(&self, input: &str) -> Result<String, ToolError> {
            Ok(input.to_string())
        }
    }

    #[test]
    fn registry_tracks_tools_and_specs() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool { name: "sql" }));
        registry.register(Arc::new(DummyTool { name: "shell" }));

        assert_eq!(registry.list(), vec!["shell", "sql"]);

        let spec_names = registry
            .specs()
            .into_iter()
            .map(|spec| spec.name)
            .collect::<Vec<_>>();
        assert_eq!(spec_names, vec!["shell", "sql"]);
        assert_eq!(registry.specs()[0].args_schema["required"][0], "input");
    }

    #[test]
    fn subset_keeps_known_tools_only() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool { name: "sql" }));
        registry.register(Arc::new(DummyTool { name: "shell" }));

        let subset = registry.subset(&["shell", "missing"]);
        assert_eq!(subset.list(), vec!["shell"]);
    }
}
