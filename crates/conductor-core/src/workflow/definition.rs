//! Serde shape of an externally declared workflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The only sub-agent kind a workflow may reference.
pub const SUB_AGENT_KIND: &str = "Agent";

/// Raw workflow resource as loaded from JSON.
///
/// Exactly one of `sequential`, `parallel` or `loop` must be set; that rule is
/// enforced by [`super::validate`], not by deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Go-style duration string bounding the whole run, e.g. `"90s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequential: Option<SequentialDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelDefinition>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_: Option<LoopDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialDefinition {
    #[serde(default)]
    pub sub_agents: Vec<SubAgentReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelDefinition {
    #[serde(default)]
    pub sub_agents: Vec<SubAgentReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopDefinition {
    #[serde(default)]
    pub sub_agents: Vec<SubAgentReference>,
    #[serde(default)]
    pub max_iterations: u32,
}

/// Pointer to an executable agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    SUB_AGENT_KIND.to_string()
}

impl SubAgentReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            kind: default_kind(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new(name)
        }
    }

    /// `namespace/name`, or just `name` when no namespace is set.
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SubAgentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "{ns}/{}", self.name),
            _ => f.write_str(&self.name),
        }
    }
}
