//! Turn orchestration: session context in, streamed planner events out.

use crate::agent::Agent;
use crate::error::CoreError;
use crate::planner::{CapabilityInvoker, EventStream, PlannerError};
use crate::sessions::SessionStore;
use crate::types::Session;
use async_trait::async_trait;
use evolution_memory::policy::truncate_chars;
use evolution_protocol::{Role, SessionId, StreamEvent};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

const RUN_STREAM_BUFFER: usize = 512;
const DEFAULT_MAX_TOOL_LOG_CHARS: usize = 2000;

/// Result payload for a single run invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Session id that produced the response.
    pub session_id: SessionId,
    /// Accumulated answer text.
    pub response: String,
}

/// Streaming handle for a single run invocation.
pub struct RunStream {
    /// Session id that produced the response.
    pub session_id: SessionId,
    /// Stream of events emitted during the run.
    pub events: EventStream,
    handle: JoinHandle<Result<RunResult, CoreError>>,
}

impl RunStream {
    /// Await completion of the run and return the final result.
    pub async fn finish(self) -> Result<RunResult, CoreError> {
        self.handle
            .await
            .map_err(|err| CoreError::Executor(err.to_string()))?
    }

    /// Cancel the turn. The user turn stays recorded; no agent turn is written.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Records every capability invocation of a turn as a `tool` turn.
struct RecordingInvoker {
    agent: Agent,
    sessions: SessionStore,
    session_id: SessionId,
    max_log_chars: usize,
}

#[async_trait]
impl CapabilityInvoker for RecordingInvoker {
    async fn invoke(&self, name: &str, arguments: &str) -> String {
        let output = self.agent.capabilities().invoke(name, arguments).await;
        let entry = format!(
            "tool={name} input={} result={}",
            truncate_chars(arguments, self.max_log_chars),
            truncate_chars(&output, self.max_log_chars)
        );
        if let Err(err) = self
            .sessions
            .append_turn(&self.session_id, Role::Tool, &entry)
        {
            warn!(
                "failed to record tool turn (session_id={}, tool={}, err={})",
                self.session_id, name, err
            );
        }
        output
    }
}

/// Main orchestration facade: owns the top-level agent and the session store.
#[derive(Clone)]
pub struct Orchestrator {
    agent: Agent,
    sessions: SessionStore,
    max_tool_log_chars: usize,
}

impl Orchestrator {
    pub fn new(agent: Agent, sessions: SessionStore) -> Self {
        Self {
            agent,
            sessions,
            max_tool_log_chars: DEFAULT_MAX_TOOL_LOG_CHARS,
        }
    }

    /// Cap the tool input and result text recorded in session history.
    pub fn with_max_tool_log_chars(mut self, max_chars: usize) -> Self {
        self.max_tool_log_chars = max_chars;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Create a session, or return the existing one for `id`.
    pub fn create_session(&self, id: Option<SessionId>) -> Result<Session, CoreError> {
        self.sessions.create_session(id)
    }

    pub fn resume_session(&self, id: &SessionId) -> Result<Session, CoreError> {
        self.sessions.resume_session(id)
    }

    /// Run one turn and collect the answer.
    pub async fn run(
        &self,
        session_id: &SessionId,
        input: impl Into<String>,
    ) -> Result<RunResult, CoreError> {
        let mut stream = self.run_streamed(session_id, input)?;
        while let Some(event) = stream.events.next().await {
            if let Err(err) = event {
                debug!("run stream reported error (err={})", err);
            }
        }
        stream.finish().await
    }

    /// Run one turn in `session_id`, streaming planner events as they arrive.
    ///
    /// The turn holds the session lock from the user append until the agent
    /// turn is written.
    pub fn run_streamed(
        &self,
        session_id: &SessionId,
        input: impl Into<String>,
    ) -> Result<RunStream, CoreError> {
        self.sessions.resume_session(session_id)?;
        let input = input.into();
        info!(
            "starting turn (session_id={}, agent={}, input_len={})",
            session_id,
            self.agent.name(),
            input.len()
        );

        let (tx, rx) = mpsc::channel(RUN_STREAM_BUFFER);
        let agent = self.agent.clone();
        let sessions = self.sessions.clone();
        let max_log_chars = self.max_tool_log_chars;
        let task_session_id = session_id.clone();
        let handle = tokio::spawn(async move {
            run_turn(agent, sessions, task_session_id, input, max_log_chars, tx).await
        });

        Ok(RunStream {
            session_id: session_id.clone(),
            events: Box::pin(ReceiverStream::new(rx)),
            handle,
        })
    }
}

async fn run_turn(
    agent: Agent,
    sessions: SessionStore,
    session_id: SessionId,
    input: String,
    max_log_chars: usize,
    tx: mpsc::Sender<Result<StreamEvent, PlannerError>>,
) -> Result<RunResult, CoreError> {
    let _guard = sessions.lock_session(&session_id).await;
    let mut history = sessions.append_and_fetch(&session_id, Role::User, &input)?;
    history.pop();

    let invoker: Arc<dyn CapabilityInvoker> = Arc::new(RecordingInvoker {
        agent: agent.clone(),
        sessions: sessions.clone(),
        session_id: session_id.clone(),
        max_log_chars,
    });
    let mut stream = agent.plan(history, input, invoker);
    let mut answer = String::new();
    let mut receiver_open = true;
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let StreamEvent::AnswerDelta(text) = &event {
                    answer.push_str(text);
                }
                if receiver_open && tx.send(Ok(event)).await.is_err() {
                    debug!("run stream receiver dropped (session_id={})", session_id);
                    receiver_open = false;
                }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    "turn failed (session_id={}, err={})",
                    session_id, message
                );
                let _ = tx.send(Err(err)).await;
                return Err(CoreError::Planner(message));
            }
        }
    }

    sessions.append_turn(&session_id, Role::Agent, &answer)?;
    info!(
        "finished turn (session_id={}, answer_len={})",
        session_id,
        answer.len()
    );
    Ok(RunResult {
        session_id,
        response: answer,
    })
}
