//! Sub-agents exposed to the top-level agent as tools.

use evolution_core::{Agent, AgentTool, Capabilities, Orchestrator, SessionStore};
use evolution_memory::{MemoryService, MemoryServiceConfig, SqliteVectorStore};
use evolution_protocol::ToolError;
use evolution_test_utils::{EchoTool, FailingPlanner, HashingEmbedder, PlanStep, ScriptedPlanner};
use evolution_tools::{RecallMemoryTool, SaveMemoryTool, Tool, ToolRegistry};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn agent_tool_returns_sub_agent_answer() {
    let shell = EchoTool::new("execute_shell_command");
    let tools = ToolRegistry::new();
    tools.register(Arc::new(shell.clone()));
    let planner = ScriptedPlanner::new(vec![vec![
        PlanStep::reasoning("plan the code"),
        PlanStep::call("execute_shell_command", "cargo test"),
        PlanStep::answer("fn main() {}"),
        PlanStep::answer(" tested"),
    ]]);
    let coding = Agent::new(
        "coding",
        "write code",
        Capabilities::new(tools),
        Arc::new(planner.clone()),
    );
    let tool = AgentTool::new(coding, "Write application code and test it");

    assert_eq!(tool.name(), "coding");
    assert_eq!(tool.description(), "Write application code and test it");
    let output = tool.call("write a hello world").await.expect("call");
    assert_eq!(output, "fn main() {} tested");
    assert_eq!(shell.calls(), vec!["cargo test"]);
    let request = &planner.requests()[0];
    assert!(request.history.is_empty());
    assert_eq!(request.input, "write a hello world");
}

#[tokio::test]
async fn failing_sub_agent_is_a_tool_error() {
    let agent = Agent::new(
        "coding",
        "",
        Capabilities::default(),
        Arc::new(FailingPlanner::new("model overloaded")),
    );
    let err = AgentTool::new(agent, "code").call("x").await.unwrap_err();
    assert!(matches!(
        err,
        ToolError::ExecutionFailed(message) if message.contains("model overloaded")
    ));
}

#[tokio::test]
async fn top_level_agent_saves_and_recalls_memory_mid_turn() {
    let memory = Arc::new(
        MemoryService::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(SqliteVectorStore::open_in_memory().expect("store")),
            MemoryServiceConfig::default(),
        )
        .expect("memory"),
    );
    let tools = ToolRegistry::new();
    tools.register(Arc::new(SaveMemoryTool::new(memory.clone())));
    tools.register(Arc::new(RecallMemoryTool::new(memory)));
    let planner = ScriptedPlanner::new(vec![
        vec![
            PlanStep::call("recall_memory", "deploy target"),
            PlanStep::call("save_memory", "The deploy target is staging-eu"),
            PlanStep::answer("saved"),
        ],
        vec![
            PlanStep::call("recall_memory", "what is the deploy target"),
            PlanStep::answer("staging-eu"),
        ],
    ]);
    let orchestrator = Orchestrator::new(
        Agent::new("evolution", "", Capabilities::new(tools), Arc::new(planner.clone())),
        SessionStore::in_memory(),
    );
    let first = orchestrator.create_session(None).expect("session");
    orchestrator.run(&first.id, "remember the deploy target").await.expect("run");
    let second = orchestrator.create_session(None).expect("session");
    orchestrator.run(&second.id, "where do we deploy?").await.expect("run");

    let outputs = planner.tool_outputs();
    assert_eq!(outputs[0], "No relevant memories found.");
    assert!(outputs[1].starts_with("Memory saved"));
    assert!(outputs[2].starts_with("Found 1 relevant memories:"));
    assert!(outputs[2].contains("The deploy target is staging-eu"));
}
