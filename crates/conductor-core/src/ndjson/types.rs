//! Provider-neutral delta types.

use serde::{Deserialize, Serialize};

/// One fragment of a model response as received from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Delta {
    /// A delta carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A delta carrying only a finish signal.
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// A delta carrying a single tool-call fragment.
    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            tool_calls: vec![fragment],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Collapse a whole response into one synthetic delta.
    ///
    /// Non-streaming backends hand this to the aggregator so both modes share
    /// one code path. Text and tool-call fragments keep their order; the last
    /// non-empty finish signal and usage report win.
    pub fn complete(deltas: impl IntoIterator<Item = Self>) -> Self {
        let mut merged = Self::default();
        let mut text = String::new();
        for delta in deltas {
            if let Some(chunk) = delta.text {
                text.push_str(&chunk);
            }
            merged.tool_calls.extend(delta.tool_calls);
            if let Some(reason) = delta.finish_reason.filter(|r| !r.is_empty()) {
                merged.finish_reason = Some(reason);
            }
            if delta.usage.is_some() {
                merged.usage = delta.usage;
            }
        }
        if !text.is_empty() {
            merged.text = Some(text);
        }
        merged
    }
}

/// A piece of one tool call, keyed by its position in the response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            id: None,
            name: None,
            arguments: None,
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}
