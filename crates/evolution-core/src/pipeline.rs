//! Splits a planner event stream into the reasoning and response channels.

use crate::planner::PlannerError;
use evolution_protocol::{ChannelEvent, ChannelSink, StreamEvent};
use futures_util::{Stream, StreamExt};
use log::debug;
use thiserror::Error;

/// Errors raised while consuming a turn's stream.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("streaming error: {0}")]
    Stream(#[from] PlannerError),
}

/// Stateful classifier for raw stream events.
///
/// Each channel opens at most once and reasoning closes at most once. The
/// reasoning channel opens on the first reasoning delta, even when the
/// response has already started.
#[derive(Debug, Default)]
pub struct StreamDemux {
    reasoning_started: bool,
    reasoning_closed: bool,
    response_started: bool,
    answer: String,
}

impl StreamDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one raw event into zero or more channel events.
    pub fn push(&mut self, event: StreamEvent) -> Vec<ChannelEvent> {
        let mut out = Vec::new();
        match event {
            StreamEvent::ReasoningDelta(text) => {
                if !self.reasoning_started {
                    self.reasoning_started = true;
                    out.push(ChannelEvent::ReasoningOpened);
                }
                if !text.is_empty() {
                    out.push(ChannelEvent::Reasoning(text));
                }
            }
            StreamEvent::AnswerDelta(text) => {
                if self.reasoning_started && !self.reasoning_closed {
                    self.reasoning_closed = true;
                    out.push(ChannelEvent::ReasoningClosed);
                }
                if !self.response_started {
                    self.response_started = true;
                    out.push(ChannelEvent::ResponseOpened);
                }
                if !text.is_empty() {
                    self.answer.push_str(&text);
                    out.push(ChannelEvent::Response(text));
                }
            }
            StreamEvent::Other { .. } => {}
        }
        out
    }

    /// Answer text accumulated so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Whether any answer delta has been seen.
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// End of stream: returns the trailing events and the accumulated answer.
    pub fn finish(mut self) -> (Vec<ChannelEvent>, String) {
        let mut out = Vec::new();
        if self.reasoning_started && !self.reasoning_closed {
            self.reasoning_closed = true;
            out.push(ChannelEvent::ReasoningClosed);
        }
        (out, self.answer)
    }
}

/// Drive `stream` to completion, forwarding channel events to `sink` as they
/// are classified. Stops at the first stream error.
pub async fn consume<S>(stream: &mut S, sink: &dyn ChannelSink) -> Result<String, PipelineError>
where
    S: Stream<Item = Result<StreamEvent, PlannerError>> + Unpin + ?Sized,
{
    let mut demux = StreamDemux::new();
    let mut events = 0usize;
    while let Some(item) = stream.next().await {
        let event = item?;
        events += 1;
        for channel_event in demux.push(event) {
            sink.emit(channel_event);
        }
    }
    let (trailing, answer) = demux.finish();
    for channel_event in trailing {
        sink.emit(channel_event);
    }
    debug!(
        "consumed turn stream (events={}, answer_len={})",
        events,
        answer.len()
    );
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::{PipelineError, StreamDemux, consume};
    use crate::planner::PlannerError;
    use evolution_protocol::{ChannelEvent, ChannelSink, StreamEvent};
    use futures_util::stream;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Collect(Mutex<Vec<ChannelEvent>>);

    impl ChannelSink for Collect {
        fn emit(&self, event: ChannelEvent) {
            self.0.lock().push(event);
        }
    }

    fn r(text: &str) -> StreamEvent {
        StreamEvent::ReasoningDelta(text.to_string())
    }

    fn a(text: &str) -> StreamEvent {
        StreamEvent::AnswerDelta(text.to_string())
    }

    #[test]
    fn reasoning_then_answer_opens_each_channel_once() {
        let mut demux = StreamDemux::new();
        let mut events = Vec::new();
        for event in [r("a"), r("b"), a("x"), a("y")] {
            events.extend(demux.push(event));
        }
        let (trailing, answer) = demux.finish();
        assert!(trailing.is_empty());
        assert_eq!(answer, "xy");
        assert_eq!(
            events,
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
    }

    #[test]
    fn answer_without_reasoning_skips_reasoning_channel() {
        let mut demux = StreamDemux::new();
        let events = demux.push(a("only"));
        assert_eq!(
            events,
            vec![
                ChannelEvent::ResponseOpened,
                ChannelEvent::Response("only".to_string())
            ]
        );
    }

    #[test]
    fn other_events_and_empty_deltas_emit_no_text() {
        let mut demux = StreamDemux::new();
        assert!(
            demux
                .push(StreamEvent::Other {
                    kind: "response.created".to_string()
                })
                .is_empty()
        );
        assert_eq!(demux.push(r("")), vec![ChannelEvent::ReasoningOpened]);
        assert_eq!(
            demux.push(a("")),
            vec![ChannelEvent::ReasoningClosed, ChannelEvent::ResponseOpened]
        );
        assert_eq!(demux.answer(), "");
    }

    #[test]
    fn reasoning_after_answer_opens_its_channel() {
        let mut demux = StreamDemux::new();
        demux.push(a("Let me check."));
        assert_eq!(
            demux.push(r("thinking")),
            vec![
                ChannelEvent::ReasoningOpened,
                ChannelEvent::Reasoning("thinking".to_string())
            ]
        );
        assert_eq!(
            demux.push(a(" Done.")),
            vec![
                ChannelEvent::ReasoningClosed,
                ChannelEvent::Response(" Done.".to_string())
            ]
        );
        assert_eq!(
            demux.push(r("again")),
            vec![ChannelEvent::Reasoning("again".to_string())]
        );
        assert_eq!(demux.push(a("!")), vec![ChannelEvent::Response("!".to_string())]);
        let (trailing, answer) = demux.finish();
        assert!(trailing.is_empty());
        assert_eq!(answer, "Let me check. Done.!");
    }

    #[test]
    fn late_reasoning_without_more_answer_closes_at_finish() {
        let mut demux = StreamDemux::new();
        demux.push(a("x"));
        demux.push(r("late"));
        let (trailing, answer) = demux.finish();
        assert_eq!(trailing, vec![ChannelEvent::ReasoningClosed]);
        assert_eq!(answer, "x");
    }

    #[test]
    fn unanswered_reasoning_closes_at_finish() {
        let mut demux = StreamDemux::new();
        demux.push(r("thinking"));
        let (trailing, answer) = demux.finish();
        assert_eq!(trailing, vec![ChannelEvent::ReasoningClosed]);
        assert_eq!(answer, "");
    }

    #[tokio::test]
    async fn consume_forwards_in_order_and_stops_on_error() {
        let sink = Collect::default();
        let mut ok = stream::iter(vec![Ok(r("a")), Ok(a("x"))]);
        let answer = consume(&mut ok, &sink).await.expect("consume");
        assert_eq!(answer, "x");
        assert_eq!(sink.0.lock().len(), 5);

        let sink = Collect::default();
        let mut failing = stream::iter(vec![
            Ok(a("partial")),
            Err(PlannerError::Provider("boom".to_string())),
            Ok(a("never")),
        ]);
        let err = consume(&mut failing, &sink).await.unwrap_err();
        assert!(matches!(err, PipelineError::Stream(PlannerError::Provider(_))));
        assert_eq!(
            sink.0.lock().last(),
            Some(&ChannelEvent::Response("partial".to_string()))
        );
    }
}
