//! Per-invocation delta aggregator.
//!
//! Turns the deltas of one model call into zero or more partial text events
//! followed by exactly one final event. State lives in one
//! [`AggregatorState`] owned by the invocation runner and is consumed by
//! [`AggregatorState::finish`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use conductor_core::event::{EventDraft, FinishReason, Response, Termination, ToolCall};
use conductor_core::ndjson::{Delta, ToolCallFragment, Usage};

/// Why the delta stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Upstream ended or closed the stream.
    Completed,
    /// The caller stopped reading.
    Cancelled,
    /// Upstream failed.
    TransportError(String),
}

#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn merge(&mut self, fragment: ToolCallFragment) {
        if let Some(id) = fragment.id.filter(|s| !s.is_empty())
            && self.id.is_empty()
        {
            self.id = id;
        }
        if let Some(name) = fragment.name.filter(|s| !s.is_empty())
            && self.name.is_empty()
        {
            self.name = name;
        }
        if let Some(arguments) = fragment.arguments {
            self.arguments.push_str(&arguments);
        }
    }

    fn into_tool_call(self, index: u32) -> Option<ToolCall> {
        if self.id.is_empty() && self.name.is_empty() {
            return None;
        }
        let arguments = parse_arguments(&self.arguments).unwrap_or_else(|| {
            warn!(
                index,
                tool = %self.name,
                "Tool call arguments are not a JSON object, using empty arguments"
            );
            Map::new()
        });
        Some(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Some(Map::new());
    }
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Accumulated output of one model call.
#[derive(Debug)]
pub struct AggregatorState {
    author: String,
    text: String,
    tool_calls: BTreeMap<u32, PendingToolCall>,
    finish_signal: Option<String>,
    usage: Usage,
    deltas: usize,
}

impl AggregatorState {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: String::new(),
            tool_calls: BTreeMap::new(),
            finish_signal: None,
            usage: Usage::default(),
            deltas: 0,
        }
    }

    /// Fold one delta into the state.
    ///
    /// Returns a partial text event when the delta carries new text.
    pub fn push(&mut self, delta: Delta) -> Option<EventDraft> {
        self.deltas += 1;

        for fragment in delta.tool_calls {
            self.tool_calls
                .entry(fragment.index)
                .or_default()
                .merge(fragment);
        }

        if let Some(reason) = delta.finish_reason.filter(|r| !r.trim().is_empty()) {
            self.finish_signal = Some(reason);
        }

        if let Some(usage) = delta.usage {
            self.usage.input_tokens = self.usage.input_tokens.max(usage.input_tokens);
            self.usage.output_tokens = self.usage.output_tokens.max(usage.output_tokens);
        }

        let text = delta.text.filter(|t| !t.is_empty())?;
        self.text.push_str(&text);
        Some(EventDraft::partial_text(&self.author, text))
    }

    /// Whether any text, tool-call fragment or finish signal has arrived.
    pub fn has_progress(&self) -> bool {
        !self.text.is_empty() || !self.tool_calls.is_empty() || self.finish_signal.is_some()
    }

    /// Build the single final event.
    ///
    /// A transport error with no progress yields an error event; every other
    /// ending yields a response carrying whatever was accumulated.
    pub fn finish(self, end: StreamEnd) -> EventDraft {
        let termination = match end {
            StreamEnd::Completed => Termination::Completed,
            StreamEnd::Cancelled => Termination::Cancelled,
            StreamEnd::TransportError(message) => {
                if !self.has_progress() {
                    debug!(author = %self.author, %message, "Stream failed before any output");
                    return EventDraft::error(self.author, message);
                }
                Termination::TransportError { message }
            }
        };

        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .filter_map(|(index, pending)| pending.into_tool_call(index))
            .collect();

        let finish_reason = self
            .finish_signal
            .as_deref()
            .and_then(FinishReason::classify)
            .or_else(|| (!tool_calls.is_empty()).then_some(FinishReason::ToolCalls));

        debug!(
            author = %self.author,
            deltas = self.deltas,
            text_len = self.text.len(),
            tool_calls = tool_calls.len(),
            ?finish_reason,
            ?termination,
            "Aggregated model response"
        );

        let response = Response {
            text: (!self.text.is_empty()).then_some(self.text),
            tool_calls,
            finish_reason,
            termination,
            usage: self.usage,
        };
        EventDraft::response(self.author, response)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use conductor_core::event::{EventKind, EventPayload};
    use serde_json::json;

    fn response(draft: &EventDraft) -> &Response {
        match &draft.payload {
            EventPayload::Response(response) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn partial_text_per_text_delta() {
        let mut state = AggregatorState::new("writer");
        let first = state.push(Delta::text("Hel")).unwrap();
        assert!(first.partial);
        assert_eq!(first.kind, EventKind::Text);
        assert!(state.push(Delta::finish("stop")).is_none());
        assert!(state.push(Delta::text("")).is_none());
        state.push(Delta::text("lo"));

        let final_event = state.finish(StreamEnd::Completed);
        assert!(!final_event.partial);
        let response = response(&final_event);
        assert_eq!(response.text.as_deref(), Some("Hello"));
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.termination, Termination::Completed);
    }

    #[test]
    fn reconstructs_tool_call_from_fragments() {
        let mut state = AggregatorState::new("researcher");
        state.push(Delta::tool_call(ToolCallFragment::new(0).id("call_1")));
        state.push(Delta::tool_call(ToolCallFragment::new(0).name("lookup")));
        state.push(Delta::tool_call(ToolCallFragment::new(0).arguments("{\"q\":")));
        state.push(Delta::tool_call(ToolCallFragment::new(0).arguments("\"x\"}")));

        let final_event = state.finish(StreamEnd::Completed);
        assert_eq!(final_event.kind, EventKind::ToolCall);
        let response = response(&final_event);
        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "lookup");
        assert_eq!(Value::Object(call.arguments.clone()), json!({"q": "x"}));
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn id_and_name_are_not_overwritten_once_set() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::tool_call(
            ToolCallFragment::new(0).id("call_1").name("lookup"),
        ));
        state.push(Delta::tool_call(
            ToolCallFragment::new(0).id("call_2").name("other"),
        ));
        let final_event = state.finish(StreamEnd::Completed);
        let call = &response(&final_event).tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "lookup");
    }

    #[test]
    fn tool_calls_ordered_by_index() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::tool_call(ToolCallFragment::new(2).name("third")));
        state.push(Delta::tool_call(ToolCallFragment::new(0).name("first")));
        state.push(Delta::tool_call(ToolCallFragment::new(1).name("second")));
        let final_event = state.finish(StreamEnd::Completed);
        let names: Vec<_> = response(&final_event)
            .tool_calls
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn malformed_arguments_keep_the_call() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::tool_call(
            ToolCallFragment::new(0)
                .id("call_1")
                .name("lookup")
                .arguments("{\"q\":"),
        ));
        state.push(Delta::tool_call(ToolCallFragment::new(1).name("list").arguments("[1]")));
        let final_event = state.finish(StreamEnd::Completed);
        let calls = &response(&final_event).tool_calls;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].arguments.is_empty());
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn anonymous_fragments_are_dropped() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::tool_call(ToolCallFragment::new(0).arguments("{}")));
        state.push(Delta::text("ok"));
        let final_event = state.finish(StreamEnd::Completed);
        assert_eq!(final_event.kind, EventKind::Text);
        let response = response(&final_event);
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.finish_reason, None);
    }

    #[test]
    fn finish_signal_never_regresses() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::finish("length"));
        state.push(Delta::finish(""));
        state.push(Delta::text("x"));
        let final_event = state.finish(StreamEnd::Completed);
        assert_eq!(
            response(&final_event).finish_reason,
            Some(FinishReason::MaxTokens)
        );
    }

    #[test]
    fn explicit_finish_reason_wins_over_inference() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::tool_call(ToolCallFragment::new(0).name("lookup")));
        state.push(Delta::finish("content_filter"));
        let final_event = state.finish(StreamEnd::Completed);
        assert_eq!(
            response(&final_event).finish_reason,
            Some(FinishReason::Safety)
        );
    }

    #[test]
    fn usage_keeps_largest_reported_counts() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::text("a").with_usage(Usage {
            input_tokens: 10,
            output_tokens: 1,
        }));
        state.push(Delta::finish("stop").with_usage(Usage {
            input_tokens: 10,
            output_tokens: 6,
        }));
        let final_event = state.finish(StreamEnd::Completed);
        assert_eq!(
            response(&final_event).usage,
            Usage {
                input_tokens: 10,
                output_tokens: 6
            }
        );
    }

    #[test]
    fn cancellation_still_emits_final_event() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::text("half"));
        let final_event = state.finish(StreamEnd::Cancelled);
        let response = response(&final_event);
        assert_eq!(response.text.as_deref(), Some("half"));
        assert_eq!(response.termination, Termination::Cancelled);
    }

    #[test]
    fn cancellation_with_nothing_is_an_empty_response() {
        let state = AggregatorState::new("a");
        let final_event = state.finish(StreamEnd::Cancelled);
        assert_eq!(final_event.kind, EventKind::Text);
        assert_eq!(response(&final_event).text, None);
    }

    #[test]
    fn transport_error_without_progress_is_error_event() {
        let state = AggregatorState::new("a");
        let final_event = state.finish(StreamEnd::TransportError("reset".into()));
        assert_eq!(final_event.kind, EventKind::Error);
        assert!(!final_event.partial);
    }

    #[test]
    fn transport_error_after_progress_keeps_partial_output() {
        let mut state = AggregatorState::new("a");
        state.push(Delta::text("partial"));
        let final_event = state.finish(StreamEnd::TransportError("reset".into()));
        assert_eq!(final_event.kind, EventKind::Text);
        assert!(matches!(
            response(&final_event).termination,
            Termination::TransportError { .. }
        ));
    }

    #[test]
    fn same_deltas_give_byte_identical_final_events() {
        let deltas = vec![
            Delta::text("Looking up"),
            Delta::tool_call(ToolCallFragment::new(1).id("call_b").name("fetch")),
            Delta::tool_call(ToolCallFragment::new(0).id("call_a").name("lookup")),
            Delta::tool_call(ToolCallFragment::new(0).arguments("{\"q\":\"a\",")),
            Delta::tool_call(ToolCallFragment::new(1).arguments("{\"url\":")),
            Delta::tool_call(ToolCallFragment::new(0).arguments("\"n\":2}")),
            Delta::tool_call(ToolCallFragment::new(1).arguments("\"u\"}")),
            Delta::finish("tool_calls"),
        ];
        let run = || {
            let mut state = AggregatorState::new("a");
            for delta in deltas.clone() {
                state.push(delta);
            }
            serde_json::to_vec(&state.finish(StreamEnd::Completed)).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn non_streaming_uses_the_same_path() {
        let whole = Delta::complete(vec![
            Delta::text("Hel"),
            Delta::tool_call(ToolCallFragment::new(0).id("c").name("n")),
            Delta::text("lo"),
            Delta::tool_call(ToolCallFragment::new(0).arguments("{}")),
        ]);
        let mut state = AggregatorState::new("a");
        assert!(state.push(whole).is_some());
        let final_event = state.finish(StreamEnd::Completed);
        let response = response(&final_event);
        assert_eq!(response.text.as_deref(), Some("Hello"));
        assert_eq!(response.tool_calls.len(), 1);
    }
}
