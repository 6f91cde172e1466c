//! Planner backed by the OpenAI Responses API with server-sent events.

use super::sse::SseDecoder;
use super::{EventStream, HostedCapability, PlanRequest, Planner, PlannerError};
use evolution_protocol::{Role, StreamEvent};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const EVENT_BUFFER: usize = 256;

/// Settings for an `OpenAiPlanner`.
#[derive(Clone)]
pub struct OpenAiPlannerConfig {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
    /// Follow-up requests allowed after function calls in one turn.
    pub max_tool_rounds: usize,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for OpenAiPlannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiPlannerConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("reasoning_summary", &self.reasoning_summary)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

impl OpenAiPlannerConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            reasoning_effort: None,
            reasoning_summary: None,
            max_tool_rounds: 8,
            request_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FunctionCall {
    call_id: String,
    name: String,
    arguments: String,
}

/// Per-request state collected while reading one response stream.
#[derive(Debug, Default)]
struct RoundState {
    response_id: Option<String>,
    calls: Vec<FunctionCall>,
}

/// Streams reasoning summaries and answer text from the Responses API,
/// executing function calls through the request's invoker.
#[derive(Clone)]
pub struct OpenAiPlanner {
    config: Arc<OpenAiPlannerConfig>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiPlanner")
            .field("config", &self.config)
            .finish()
    }
}

impl OpenAiPlanner {
    pub fn new(config: OpenAiPlannerConfig) -> Result<Self, PlannerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| PlannerError::Http(err.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    /// Model used for requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_body(
        &self,
        instructions: &str,
        tools: &[Value],
        input: Vec<Value>,
        previous_response_id: Option<&str>,
    ) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "instructions": instructions,
            "input": input,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }
        if let Some(id) = previous_response_id {
            body["previous_response_id"] = Value::String(id.to_string());
        }
        let mut reasoning = serde_json::Map::new();
        if let Some(effort) = &self.config.reasoning_effort {
            reasoning.insert("effort".to_string(), Value::String(effort.clone()));
        }
        if let Some(summary) = &self.config.reasoning_summary {
            reasoning.insert("summary".to_string(), Value::String(summary.clone()));
        }
        if !reasoning.is_empty() {
            body["reasoning"] = Value::Object(reasoning);
        }
        body
    }

    async fn run(
        &self,
        request: PlanRequest,
        tx: &mpsc::Sender<Result<StreamEvent, PlannerError>>,
    ) -> Result<(), PlannerError> {
        let tools = build_tools(&request);
        let mut input = build_input(&request);
        let mut previous_response_id: Option<String> = None;
        let mut rounds = 0usize;
        loop {
            let body = self.request_body(
                &request.instructions,
                &tools,
                std::mem::take(&mut input),
                previous_response_id.as_deref(),
            );
            debug!(
                "starting planner request (model={}, round={}, tools={})",
                self.config.model,
                rounds,
                tools.len()
            );
            let Some(state) = self.stream_round(&body, tx).await? else {
                debug!("planner stream receiver dropped (model={})", self.config.model);
                return Ok(());
            };
            if state.calls.is_empty() {
                return Ok(());
            }
            if rounds >= self.config.max_tool_rounds {
                warn!(
                    "planner exceeded tool rounds (model={}, max_tool_rounds={})",
                    self.config.model, self.config.max_tool_rounds
                );
                return Err(PlannerError::ToolRoundLimit(self.config.max_tool_rounds));
            }
            rounds += 1;
            previous_response_id = Some(state.response_id.ok_or_else(|| {
                PlannerError::Decode("response id missing from stream".to_string())
            })?);
            for call in state.calls {
                info!(
                    "executing function call (name={}, args_len={})",
                    call.name,
                    call.arguments.len()
                );
                let output = request.invoker.invoke(&call.name, &call.arguments).await;
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": call.call_id,
                    "output": output,
                }));
            }
        }
    }

    /// Send one request and forward its events; `None` when the receiver is gone.
    async fn stream_round(
        &self,
        body: &Value,
        tx: &mpsc::Sender<Result<StreamEvent, PlannerError>>,
    ) -> Result<Option<RoundState>, PlannerError> {
        let url = format!("{}/responses", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| PlannerError::Http(format!("OpenAI request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PlannerError::Provider(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut state = RoundState::default();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|err| PlannerError::Http(err.to_string()))?;
            for payload in decoder.push(&chunk) {
                if !forward(&payload, &mut state, tx).await? {
                    return Ok(None);
                }
            }
        }
        if let Some(payload) = decoder.finish()
            && !forward(&payload, &mut state, tx).await?
        {
            return Ok(None);
        }
        Ok(Some(state))
    }
}

impl Planner for OpenAiPlanner {
    fn decide(&self, request: PlanRequest) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let planner = self.clone();
        tokio::spawn(async move {
            if let Err(err) = planner.run(request, &tx).await {
                warn!(
                    "planner turn failed (model={}, err={})",
                    planner.config.model, err
                );
                let _ = tx.send(Err(err)).await;
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

async fn forward(
    payload: &str,
    state: &mut RoundState,
    tx: &mpsc::Sender<Result<StreamEvent, PlannerError>>,
) -> Result<bool, PlannerError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| PlannerError::Decode(format!("invalid stream payload: {err}")))?;
    let event = map_payload(&value, state)?;
    Ok(tx.send(Ok(event)).await.is_ok())
}

fn map_payload(value: &Value, state: &mut RoundState) -> Result<StreamEvent, PlannerError> {
    let kind = value["type"].as_str().unwrap_or("unknown");
    let delta = || value["delta"].as_str().unwrap_or_default().to_string();
    match kind {
        "response.reasoning_summary_text.delta" => Ok(StreamEvent::ReasoningDelta(delta())),
        "response.output_text.delta" => Ok(StreamEvent::AnswerDelta(delta())),
        "response.created" | "response.completed" => {
            if let Some(id) = value["response"]["id"].as_str() {
                state.response_id = Some(id.to_string());
            }
            Ok(StreamEvent::Other {
                kind: kind.to_string(),
            })
        }
        "response.output_item.done" => {
            let item = &value["item"];
            if item["type"].as_str() == Some("function_call") {
                state.calls.push(FunctionCall {
                    call_id: item["call_id"].as_str().unwrap_or_default().to_string(),
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                    arguments: item["arguments"].as_str().unwrap_or("{}").to_string(),
                });
            }
            Ok(StreamEvent::Other {
                kind: kind.to_string(),
            })
        }
        "response.failed" => Err(PlannerError::Provider(
            value["response"]["error"]["message"]
                .as_str()
                .unwrap_or("response failed")
                .to_string(),
        )),
        "error" => Err(PlannerError::Provider(
            value["message"]
                .as_str()
                .or_else(|| value["error"]["message"].as_str())
                .unwrap_or("stream error")
                .to_string(),
        )),
        other => Ok(StreamEvent::Other {
            kind: other.to_string(),
        }),
    }
}

fn role_to_string(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Agent => "assistant",
        Role::Tool => "system",
    }
}

fn build_input(request: &PlanRequest) -> Vec<Value> {
    let mut input: Vec<Value> = request
        .history
        .iter()
        .map(|turn| {
            json!({
                "role": role_to_string(turn.role),
                "content": turn.content,
            })
        })
        .collect();
    input.push(json!({ "role": "user", "content": request.input }));
    input
}

fn build_tools(request: &PlanRequest) -> Vec<Value> {
    let mut tools: Vec<Value> = request
        .tools
        .iter()
        .map(|spec| {
            json!({
                "type": "function",
                "name": spec.name,
                "description": spec.description,
                "parameters": spec.args_schema,
                "strict": true,
            })
        })
        .collect();
    for hosted in &request.hosted {
        match hosted {
            HostedCapability::WebSearch => tools.push(json!({ "type": "web_search_preview" })),
        }
    }
    tools
}
