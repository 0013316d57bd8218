//! Early loop termination.

use conductor_core::config::LoopStopConfig;
use conductor_core::event::Response;

/// Decides whether a sub-agent's final response asks the loop to stop.
pub trait StopRecognizer: Send + Sync {
    fn should_stop(&self, response: &Response) -> bool;
}

/// Stops when the response calls a named tool or its text carries a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStopSignal {
    tool_name: String,
    text_marker: Option<String>,
}

impl LoopStopSignal {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            text_marker: None,
        }
    }

    #[must_use]
    pub fn with_text_marker(mut self, marker: impl Into<String>) -> Self {
        self.text_marker = Some(marker.into());
        self
    }
}

impl Default for LoopStopSignal {
    fn default() -> Self {
        Self::from(&LoopStopConfig::default())
    }
}

impl From<&LoopStopConfig> for LoopStopSignal {
    fn from(config: &LoopStopConfig) -> Self {
        Self {
            tool_name: config.tool_name.clone(),
            text_marker: config.text_marker.clone().filter(|m| !m.is_empty()),
        }
    }
}

impl StopRecognizer for LoopStopSignal {
    fn should_stop(&self, response: &Response) -> bool {
        let tool_called = !self.tool_name.is_empty()
            && response.tool_calls.iter().any(|c| c.name == self.tool_name);
        let marked = match (&self.text_marker, &response.text) {
            (Some(marker), Some(text)) => text.contains(marker.as_str()),
            _ => false,
        };
        tool_called || marked
    }
}

/// Never stops early; loops always run `maxIterations` times.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopRecognizer for NeverStop {
    fn should_stop(&self, _response: &Response) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use conductor_core::event::{Termination, ToolCall};
    use conductor_core::ndjson::Usage;

    fn response(text: Option<&str>, tools: &[&str]) -> Response {
        Response {
            text: text.map(String::from),
            tool_calls: tools
                .iter()
                .map(|name| ToolCall {
                    id: format!("call_{name}"),
                    name: (*name).to_string(),
                    arguments: Map::new(),
                })
                .collect(),
            finish_reason: None,
            termination: Termination::Completed,
            usage: Usage::default(),
        }
    }

    #[test]
    fn default_signal_is_exit_loop_tool() {
        let signal = LoopStopSignal::default();
        assert!(signal.should_stop(&response(None, &["exit_loop"])));
        assert!(!signal.should_stop(&response(Some("exit_loop"), &["lookup"])));
    }

    #[test]
    fn text_marker_matches_final_text() {
        let signal = LoopStopSignal::new("exit_loop").with_text_marker("APPROVED");
        assert!(signal.should_stop(&response(Some("Review: APPROVED."), &[])));
        assert!(!signal.should_stop(&response(Some("needs work"), &[])));
    }

    #[test]
    fn built_from_config() {
        let config = LoopStopConfig {
            tool_name: "escalate".into(),
            text_marker: Some(String::new()),
        };
        let signal = LoopStopSignal::from(&config);
        assert!(signal.should_stop(&response(None, &["escalate"])));
        assert!(!signal.should_stop(&response(Some(""), &[])));
    }

    #[test]
    fn never_stop_ignores_everything() {
        assert!(!NeverStop.should_stop(&response(Some("x"), &["exit_loop"])));
    }
}
