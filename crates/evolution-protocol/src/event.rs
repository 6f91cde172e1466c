//! Raw planner stream events and the classified channel events derived from them.

use serde::{Deserialize, Serialize};

/// Event produced by a planner while a turn is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum StreamEvent {
    /// Incremental reasoning-summary text.
    ReasoningDelta(String),
    /// Incremental final-answer text.
    AnswerDelta(String),
    /// Any other provider event; carried for observability only.
    Other { kind: String },
}

impl StreamEvent {
    /// Short label used in logs.
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::ReasoningDelta(_) => "reasoning_delta",
            StreamEvent::AnswerDelta(_) => "answer_delta",
            StreamEvent::Other { kind } => kind,
        }
    }
}

/// Classified output of the streaming pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum ChannelEvent {
    /// The reasoning channel started.
    ReasoningOpened,
    /// Text on the reasoning channel.
    Reasoning(String),
    /// The reasoning channel ended before the response began.
    ReasoningClosed,
    /// The response channel started.
    ResponseOpened,
    /// Text on the response channel.
    Response(String),
}

/// Sink for classified channel events.
pub trait ChannelSink: Send + Sync {
    /// Emit a channel event to the sink.
    fn emit(&self, event: ChannelEvent);
}

#[cfg(test)]
mod tests {
    use super::StreamEvent;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn stream_events_serialize_with_type_tag() {
        let value = serde_json::to_value(StreamEvent::AnswerDelta("hi".to_string())).expect("json");
        assert_eq!(value, json!({ "type": "answer_delta", "payload": "hi" }));
        let other = StreamEvent::Other {
            kind: "response.created".to_string(),
        };
        assert_eq!(other.kind(), "response.created");
    }
}
