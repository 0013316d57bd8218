//! Canonical event schema.
//!
//! Every fact recorded about a workflow run is an [`Event`] appended to a
//! session. Producers build an [`EventDraft`]; the session log stamps it with
//! a sequence number and timestamp when it is appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ndjson::Usage;

/// Lifecycle status shared by invocations and workflow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl Status {
    /// Whether this status is final.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse event classification exposed to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    ToolCall,
    ToolResult,
    Error,
    StatusChange,
}

/// Canonical reason a model call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    ToolCalls,
    Recitation,
}

impl FinishReason {
    /// Map a provider-specific finish signal onto the canonical set.
    ///
    /// Returns `None` for empty input. Unrecognised non-empty signals are
    /// treated as a normal stop.
    pub fn classify(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let reason = match raw.to_ascii_lowercase().as_str() {
            "length" | "max_tokens" | "max_output_tokens" | "finish_reason_max_tokens" => {
                Self::MaxTokens
            }
            "content_filter" | "safety" | "blocked" | "prohibited_content" | "spii"
            | "finish_reason_safety" => Self::Safety,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "recitation" | "finish_reason_recitation" => Self::Recitation,
            _ => Self::Stop,
        };
        Some(reason)
    }
}

/// How the upstream delta stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Termination {
    /// The stream ended or was closed by the provider.
    Completed,
    /// The caller stopped reading (cancellation or deadline).
    Cancelled,
    /// The transport failed after some output had already arrived.
    TransportError { message: String },
}

/// A tool call reconstructed from streamed fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// The single final result of one model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    pub termination: Termination,
    #[serde(default)]
    pub usage: Usage,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A streamed text fragment for live display.
    Text { text: String },
    /// The assembled output of one model call.
    Response(Response),
    /// Output of a tool execution performed outside the engine.
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
    /// A failure that ended an invocation.
    Error { message: String },
    /// An invocation changed status.
    Status {
        invocation_id: String,
        status: Status,
    },
}

/// An event that has not been appended to a session yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub author: String,
    pub kind: EventKind,
    pub partial: bool,
    pub payload: EventPayload,
}

impl EventDraft {
    /// Partial text fragment.
    pub fn partial_text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            kind: EventKind::Text,
            partial: true,
            payload: EventPayload::Text { text: text.into() },
        }
    }

    /// Final response. Classified as a tool call when it carries any.
    pub fn response(author: impl Into<String>, response: Response) -> Self {
        let kind = if response.tool_calls.is_empty() {
            EventKind::Text
        } else {
            EventKind::ToolCall
        };
        Self {
            author: author.into(),
            kind,
            partial: false,
            payload: EventPayload::Response(response),
        }
    }

    pub fn tool_result(
        author: impl Into<String>,
        call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            author: author.into(),
            kind: EventKind::ToolResult,
            partial: false,
            payload: EventPayload::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
                is_error,
            },
        }
    }

    pub fn error(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            kind: EventKind::Error,
            partial: false,
            payload: EventPayload::Error {
                message: message.into(),
            },
        }
    }

    pub fn status(
        author: impl Into<String>,
        invocation_id: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            author: author.into(),
            kind: EventKind::StatusChange,
            partial: false,
            payload: EventPayload::Status {
                invocation_id: invocation_id.into(),
                status,
            },
        }
    }
}

/// One immutable, ordered fact in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub author: String,
    pub kind: EventKind,
    pub partial: bool,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a draft with its position in the session.
    pub fn from_draft(sequence: u64, draft: EventDraft) -> Self {
        Self {
            sequence,
            author: draft.author,
            kind: draft.kind,
            partial: draft.partial,
            timestamp: Utc::now(),
            payload: draft.payload,
        }
    }

    /// The final response carried by this event, if any.
    pub const fn response(&self) -> Option<&Response> {
        match &self.payload {
            EventPayload::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Text of a partial fragment or a final response.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Text { text } => Some(text),
            EventPayload::Response(response) => response.text.as_deref(),
            _ => None,
        }
    }
}
