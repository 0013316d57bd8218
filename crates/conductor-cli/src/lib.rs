//! Conductor CLI
//!
//! Subcommands for running workflow definitions against recorded NDJSON
//! transcripts and for validating definitions.

pub mod run_cmd;
pub mod transcripts;
pub mod validate_cmd;

use std::path::Path;

use anyhow::Context;

use conductor_core::workflow::WorkflowDefinition;

/// Read a workflow definition from a JSON file.
pub fn load_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse workflow file {}", path.display()))
}
