//! NDJSON delta parser.
//!
//! Implements tolerant reader pattern: unknown fields ignored, SSE `data:`
//! prefixes stripped, `[DONE]` sentinels skipped. Two chunk shapes are
//! recognised:
//!
//! - chat-completion chunks (`{"choices":[{"delta":{...},"finish_reason":..}]}`)
//! - canonical deltas (`{"text":..,"tool_calls":[..],"finish_reason":..}`)

use serde_json::Value;

use super::types::{Delta, ToolCallFragment, Usage};
use crate::error::{Error, Result};

const DONE_SENTINEL: &str = "[DONE]";

/// Parse a whole NDJSON document into deltas, in line order.
pub fn parse_str(content: &str) -> Result<Vec<Delta>> {
    let mut deltas = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let Some(payload) = strip_framing(line) else {
            continue;
        };
        let delta = parse_line(payload)
            .map_err(|e| Error::DeltaParse(format!("line {}: {e}", number + 1)))?;
        deltas.push(delta);
    }
    Ok(deltas)
}

/// Parse a single NDJSON line.
pub fn parse_line(line: &str) -> Result<Delta> {
    let raw: Value = serde_json::from_str(line)?;
    parse_value(&raw)
}

/// Parse a JSON value into a delta.
pub fn parse_value(raw: &Value) -> Result<Delta> {
    if !raw.is_object() {
        return Err(Error::DeltaParse("delta must be a JSON object".into()));
    }
    if let Some(choices) = raw.get("choices") {
        return Ok(parse_chunk(raw, choices));
    }
    Ok(parse_canonical(raw))
}

fn strip_framing(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let payload = trimmed.strip_prefix("data:").map_or(trimmed, str::trim_start);
    if payload.is_empty() || payload == DONE_SENTINEL {
        None
    } else {
        Some(payload)
    }
}

fn parse_chunk(raw: &Value, choices: &Value) -> Delta {
    let choice = choices.as_array().and_then(|arr| arr.first());
    let delta = choice.and_then(|c| c.get("delta"));

    let text = delta
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let tool_calls = delta
        .and_then(|d| d.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| calls.iter().map(parse_chunk_tool_call).collect())
        .unwrap_or_default();

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(String::from);

    let usage = raw.get("usage").filter(|u| u.is_object()).map(|u| Usage {
        input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: u
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    });

    Delta {
        text,
        tool_calls,
        finish_reason,
        usage,
    }
}

fn parse_chunk_tool_call(call: &Value) -> ToolCallFragment {
    let function = call.get("function");
    ToolCallFragment {
        index: parse_index(call.get("index")),
        id: string_field(call.get("id")),
        name: string_field(function.and_then(|f| f.get("name"))),
        arguments: string_field(function.and_then(|f| f.get("arguments"))),
    }
}

fn parse_canonical(raw: &Value) -> Delta {
    let tool_calls = raw
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|call| ToolCallFragment {
                    index: parse_index(call.get("index")),
                    id: string_field(call.get("id")),
                    name: string_field(call.get("name")),
                    arguments: string_field(call.get("arguments")),
                })
                .collect()
        })
        .unwrap_or_default();

    Delta {
        text: string_field(raw.get("text")),
        tool_calls,
        finish_reason: string_field(raw.get("finish_reason")),
        usage: raw
            .get("usage")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
    }
}

fn parse_index(val: Option<&Value>) -> u32 {
    val.and_then(Value::as_u64)
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or(0)
}

fn string_field(val: Option<&Value>) -> Option<String> {
    val.and_then(Value::as_str).map(String::from)
}
