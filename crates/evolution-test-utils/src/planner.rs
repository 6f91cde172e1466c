use evolution_core::{EventStream, PlanRequest, Planner, PlannerError};
use evolution_protocol::StreamEvent;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One scripted planner action.
#[derive(Debug, Clone)]
pub enum PlanStep {
    Emit(StreamEvent),
    /// Invoke a capability through the request's invoker.
    CallTool { name: String, arguments: String },
    Sleep(Duration),
    Fail(String),
}

impl PlanStep {
    pub fn reasoning(text: impl Into<String>) -> Self {
        PlanStep::Emit(StreamEvent::ReasoningDelta(text.into()))
    }

    pub fn answer(text: impl Into<String>) -> Self {
        PlanStep::Emit(StreamEvent::AnswerDelta(text.into()))
    }

    pub fn call(name: impl Into<String>, input: &str) -> Self {
        PlanStep::CallTool {
            name: name.into(),
            arguments: json!({ "input": input }).to_string(),
        }
    }
}

/// Planner that replays one script per turn and records what it was asked.
///
/// The last script repeats once the queue runs dry.
#[derive(Clone)]
pub struct ScriptedPlanner {
    scripts: Arc<Mutex<VecDeque<Vec<PlanStep>>>>,
    last: Arc<Mutex<Vec<PlanStep>>>,
    requests: Arc<Mutex<Vec<PlanRequest>>>,
    tool_outputs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPlanner {
    pub fn new(scripts: Vec<Vec<PlanStep>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            last: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            tool_outputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Planner that answers every turn with `text`.
    pub fn answering(text: impl Into<String>) -> Self {
        Self::new(vec![vec![PlanStep::answer(text)]])
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().clone()
    }

    /// Text returned by every capability call made so far.
    pub fn tool_outputs(&self) -> Vec<String> {
        self.tool_outputs.lock().clone()
    }

    fn next_script(&self) -> Vec<PlanStep> {
        match self.scripts.lock().pop_front() {
            Some(script) => {
                *self.last.lock() = script.clone();
                script
            }
            None => self.last.lock().clone(),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn decide(&self, request: PlanRequest) -> EventStream {
        self.requests.lock().push(request.clone());
        let script = self.next_script();
        let outputs = self.tool_outputs.clone();
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for step in script {
                let item = match step {
                    PlanStep::Emit(event) => Ok(event),
                    PlanStep::CallTool { name, arguments } => {
                        let output = request.invoker.invoke(&name, &arguments).await;
                        outputs.lock().push(output);
                        Ok(StreamEvent::Other {
                            kind: "function_call".to_string(),
                        })
                    }
                    PlanStep::Sleep(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    PlanStep::Fail(message) => {
                        let _ = tx.send(Err(PlannerError::Provider(message))).await;
                        return;
                    }
                };
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Planner whose stream fails immediately.
#[derive(Debug, Clone)]
pub struct FailingPlanner {
    message: String,
}

impl FailingPlanner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Planner for FailingPlanner {
    fn decide(&self, _request: PlanRequest) -> EventStream {
        let message = self.message.clone();
        Box::pin(tokio_stream::once(Err(PlannerError::Provider(message))))
    }
}
