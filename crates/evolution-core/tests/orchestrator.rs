//! Orchestrator turn flow with scripted planners.

use evolution_core::{
    Agent, Capabilities, CoreError, Orchestrator, SessionStore, SqliteStateStore, consume,
};
use evolution_protocol::{ChannelEvent, Role, SessionId};
use evolution_test_utils::{
    CollectingSink, EchoTool, FailingPlanner, FailingTool, PlanStep, ScriptedPlanner,
};
use evolution_tools::ToolRegistry;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator_with(planner: ScriptedPlanner, tools: ToolRegistry) -> Orchestrator {
    let agent = Agent::new(
        "evolution",
        "be helpful",
        Capabilities::new(tools),
        Arc::new(planner),
    );
    Orchestrator::new(agent, SessionStore::in_memory())
}

#[tokio::test]
async fn streamed_turn_classifies_channels_and_records_history() {
    let planner = ScriptedPlanner::new(vec![vec![
        PlanStep::reasoning("a"),
        PlanStep::reasoning("b"),
        PlanStep::answer("x"),
        PlanStep::answer("y"),
    ]]);
    let orchestrator = orchestrator_with(planner, ToolRegistry::new());
    let session = orchestrator.create_session(None).expect("session");

    let mut run = orchestrator
        .run_streamed(&session.id, "hello")
        .expect("run");
    let sink = CollectingSink::new();
    let answer = consume(&mut run.events, &sink).await.expect("consume");
    let result = run.finish().await.expect("finish");

    assert_eq!(answer, "xy");
    assert_eq!(result.response, "xy");
    assert_eq!(
        sink.events(),
        vec![
            ChannelEvent::ReasoningOpened,
            ChannelEvent::Reasoning("a".to_string()),
            ChannelEvent::Reasoning("b".to_string()),
            ChannelEvent::ReasoningClosed,
            ChannelEvent::ResponseOpened,
            ChannelEvent::Response("x".to_string()),
            ChannelEvent::Response("y".to_string()),
        ]
    );
    let history = orchestrator.sessions().history(&session.id).expect("history");
    let turns: Vec<_> = history
        .iter()
        .map(|turn| (turn.role, turn.content.as_str()))
        .collect();
    assert_eq!(turns, vec![(Role::User, "hello"), (Role::Agent, "xy")]);
}

#[tokio::test]
async fn second_turn_sees_prior_history() {
    let planner = ScriptedPlanner::answering("ok");
    let orchestrator = orchestrator_with(planner.clone(), ToolRegistry::new());
    let session = orchestrator.create_session(None).expect("session");

    orchestrator
        .run(&session.id, "my name is Ada")
        .await
        .expect("first");
    orchestrator
        .run(&session.id, "what is my name?")
        .await
        .expect("second");

    let requests = planner.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].history.is_empty());
    let prior: Vec<_> = requests[1]
        .history
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(prior, vec!["my name is Ada", "ok"]);
    assert_eq!(requests[1].input, "what is my name?");
}

#[tokio::test]
async fn sessions_are_isolated() {
    let planner = ScriptedPlanner::answering("noted");
    let orchestrator = orchestrator_with(planner.clone(), ToolRegistry::new());
    let first = orchestrator.create_session(None).expect("first");
    let second = orchestrator.create_session(None).expect("second");
    assert_ne!(first.id, second.id);

    orchestrator.run(&first.id, "secret A").await.expect("run");
    orchestrator.run(&second.id, "question B").await.expect("run");

    let requests = planner.requests();
    assert!(requests[1].history.is_empty());
    let second_history = orchestrator.sessions().history(&second.id).expect("history");
    assert!(second_history.iter().all(|turn| turn.content != "secret A"));
}

#[tokio::test]
async fn tool_calls_are_executed_and_recorded_as_tool_turns() {
    let echo = EchoTool::new("echo");
    let tools = ToolRegistry::new();
    tools.register(Arc::new(echo.clone()));
    tools.register(Arc::new(FailingTool::new("broken")));
    let planner = ScriptedPlanner::new(vec![vec![
        PlanStep::call("echo", "ping"),
        PlanStep::call("broken", "x"),
        PlanStep::call("missing", "x"),
        PlanStep::answer("done"),
    ]]);
    let orchestrator = orchestrator_with(planner.clone(), tools);
    let session = orchestrator.create_session(None).expect("session");

    let result = orchestrator.run(&session.id, "go").await.expect("run");
    assert_eq!(result.response, "done");
    assert_eq!(echo.calls(), vec!["ping"]);
    let outputs = planner.tool_outputs();
    assert_eq!(outputs[0], "echo: ping");
    assert!(outputs[1].starts_with("Error: "));
    assert_eq!(outputs[2], "Error: unknown tool 'missing'");

    let history = orchestrator.sessions().history(&session.id).expect("history");
    let roles: Vec<_> = history.iter().map(|turn| turn.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Tool, Role::Tool, Role::Tool, Role::Agent]
    );
    assert!(history[1].content.starts_with("tool=echo"));
    assert!(history[1].content.contains("echo: ping"));
}

#[tokio::test]
async fn planner_errors_surface_and_skip_agent_turn() {
    let agent = Agent::new(
        "evolution",
        "be helpful",
        Capabilities::default(),
        Arc::new(FailingPlanner::new("quota exceeded")),
    );
    let orchestrator = Orchestrator::new(agent, SessionStore::in_memory());
    let session = orchestrator.create_session(None).expect("session");

    let mut run = orchestrator.run_streamed(&session.id, "hi").expect("run");
    let sink = CollectingSink::new();
    assert!(consume(&mut run.events, &sink).await.is_err());
    assert!(matches!(run.finish().await, Err(CoreError::Planner(_))));

    let history = orchestrator.sessions().history(&session.id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let orchestrator = orchestrator_with(ScriptedPlanner::answering("x"), ToolRegistry::new());
    let err = orchestrator
        .run_streamed(&SessionId::generate(), "hi")
        .err()
        .expect("error");
    assert!(matches!(err, CoreError::UnknownSession(_)));
}

#[tokio::test]
async fn concurrent_turns_in_one_session_do_not_interleave() {
    let planner = ScriptedPlanner::new(vec![vec![
        PlanStep::answer("part one "),
        PlanStep::Sleep(Duration::from_millis(50)),
        PlanStep::answer("part two"),
    ]]);
    let orchestrator = orchestrator_with(planner, ToolRegistry::new());
    let session = orchestrator.create_session(None).expect("session");

    let (first, second) = tokio::join!(
        orchestrator.run(&session.id, "first"),
        orchestrator.run(&session.id, "second"),
    );
    first.expect("first");
    second.expect("second");

    let history = orchestrator.sessions().history(&session.id).expect("history");
    let roles: Vec<_> = history.iter().map(|turn| turn.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Agent, Role::User, Role::Agent]);
    let indexes: Vec<_> = history.iter().map(|turn| turn.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn aborted_turn_keeps_user_turn_and_releases_session() {
    let planner = ScriptedPlanner::new(vec![
        vec![
            PlanStep::Sleep(Duration::from_secs(30)),
            PlanStep::answer("too late"),
        ],
        vec![PlanStep::answer("fresh")],
    ]);
    let orchestrator = orchestrator_with(planner, ToolRegistry::new());
    let session = orchestrator.create_session(None).expect("session");

    let run = orchestrator.run_streamed(&session.id, "slow").expect("run");
    tokio::time::sleep(Duration::from_millis(50)).await;
    run.abort();
    assert!(matches!(run.finish().await, Err(CoreError::Executor(_))));
    assert_eq!(
        orchestrator.sessions().history(&session.id).expect("history").len(),
        1
    );

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run(&session.id, "again"),
    )
    .await
    .expect("session lock released")
    .expect("run");
    assert_eq!(result.response, "fresh");
    let roles: Vec<_> = orchestrator
        .sessions()
        .history(&session.id)
        .expect("history")
        .iter()
        .map(|turn| turn.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::User, Role::Agent]);
}

#[tokio::test]
async fn persisted_session_resumes_with_history() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("state.db");
    let session_id;
    {
        let store = SessionStore::new(Some(Arc::new(SqliteStateStore::open(&path).expect("db"))));
        let agent = Agent::new(
            "evolution",
            "",
            Capabilities::default(),
            Arc::new(ScriptedPlanner::answering("stored")),
        );
        let orchestrator = Orchestrator::new(agent, store);
        session_id = orchestrator.create_session(None).expect("session").id;
        orchestrator.run(&session_id, "persist me").await.expect("run");
        orchestrator.sessions().cleanup().expect("cleanup");
    }

    let store = SessionStore::new(Some(Arc::new(SqliteStateStore::open(&path).expect("db"))));
    let session = store.resume_session(&session_id).expect("resume");
    let contents: Vec<_> = session.turns.iter().map(|turn| turn.content.as_str()).collect();
    assert_eq!(contents, vec!["persist me", "stored"]);
    assert_eq!(store.list_sessions().expect("list").len(), 1);
}
