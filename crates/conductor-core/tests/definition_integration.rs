#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Workflow definitions and transcripts as they arrive from disk.

use std::time::Duration;

use conductor_core::event::FinishReason;
use conductor_core::ndjson::{self, Delta};
use conductor_core::workflow::{
    Composition, SubAgentReference, ValidationError, WorkflowDefinition, validate,
};

fn load(json: &str) -> WorkflowDefinition {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workflow.json");
    std::fs::write(&path, json).unwrap();
    serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap()
}

#[test]
fn parallel_definition_round_trips_into_spec() {
    let definition = load(
        r#"{
            "description": "fan out research",
            "timeout": "1m30s",
            "parallel": {
                "maxWorkers": 3,
                "subAgents": [
                    { "name": "web", "namespace": "research" },
                    { "name": "papers", "namespace": "research", "kind": "Agent" },
                    { "name": "summary" }
                ]
            }
        }"#,
    );

    let spec = validate(&definition).unwrap();
    assert_eq!(spec.composition, Composition::Parallel { max_workers: 3 });
    assert_eq!(spec.timeout, Some(Duration::from_secs(90)));
    assert_eq!(spec.description.as_deref(), Some("fan out research"));
    assert_eq!(
        spec.sub_agents[0],
        SubAgentReference::namespaced("research", "web")
    );
    assert_eq!(spec.sub_agents[2].qualified_name(), "summary");
}

#[test]
fn loop_definition_uses_loop_key() {
    let definition = load(
        r#"{ "loop": { "maxIterations": 4, "subAgents": [{ "name": "a" }, { "name": "b" }] } }"#,
    );
    assert_eq!(
        validate(&definition).unwrap().composition,
        Composition::Loop { max_iterations: 4 }
    );
}

#[test]
fn loop_without_iterations_is_rejected() {
    let definition = load(r#"{ "loop": { "subAgents": [{ "name": "a" }, { "name": "b" }] } }"#);
    assert_eq!(
        validate(&definition),
        Err(ValidationError::MaxIterations { value: 0 })
    );
}

#[test]
fn recorded_chat_completion_stream_parses_in_order() {
    let transcript = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Check\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"lookup\",\"arguments\":\"\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"q\\\":1}\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":9}}\n",
        "data: [DONE]\n",
    );

    let deltas = ndjson::parse_str(transcript).unwrap();
    assert_eq!(deltas.len(), 4);

    let merged = Delta::complete(deltas);
    assert_eq!(merged.text.as_deref(), Some("Check"));
    assert_eq!(merged.tool_calls.len(), 2);
    assert_eq!(
        merged.finish_reason.as_deref().and_then(FinishReason::classify),
        Some(FinishReason::ToolCalls)
    );
    assert_eq!(merged.usage.unwrap().output_tokens, 9);
}
