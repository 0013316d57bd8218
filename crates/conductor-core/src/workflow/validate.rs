//! Structural validation of workflow definitions.
//!
//! Validation is a pure function: it performs no I/O and creates nothing, so
//! a rejected definition never leaves a partially started run behind.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::definition::{SUB_AGENT_KIND, SubAgentReference, WorkflowDefinition};
use super::duration::{DurationError, parse_duration};

pub const MIN_SUB_AGENTS: usize = 2;
pub const MAX_SUB_AGENTS: usize = 50;
pub const DEFAULT_MAX_WORKERS: u32 = 10;
pub const MAX_WORKERS: u32 = 50;
pub const MAX_ITERATIONS: u32 = 100;

/// Reasons a workflow definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("workflow must declare one of sequential, parallel or loop")]
    NoComposition,

    #[error("workflow declares more than one composition: {found:?}")]
    MultipleCompositions { found: Vec<&'static str> },

    #[error(
        "workflow must list between {min} and {max} sub-agents, got {count}",
        min = MIN_SUB_AGENTS,
        max = MAX_SUB_AGENTS
    )]
    SubAgentCount { count: usize },

    #[error("sub-agent #{position} has an empty name")]
    EmptySubAgentName { position: usize },

    #[error("sub-agent `{name}` has unsupported kind `{kind}` (expected `{expected}`)", expected = SUB_AGENT_KIND)]
    UnsupportedKind { name: String, kind: String },

    #[error("parallel maxWorkers must be between 1 and {max}, got {value}", max = MAX_WORKERS)]
    MaxWorkers { value: u32 },

    #[error("loop maxIterations must be between 1 and {max}, got {value}", max = MAX_ITERATIONS)]
    MaxIterations { value: u32 },

    #[error("invalid timeout `{value}`: {reason}")]
    InvalidTimeout {
        value: String,
        reason: DurationError,
    },
}

/// The control-flow shape of a validated workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Composition {
    Sequential,
    Parallel { max_workers: usize },
    Loop { max_iterations: u32 },
}

impl Composition {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel { .. } => "parallel",
            Self::Loop { .. } => "loop",
        }
    }
}

/// A workflow that passed validation. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSpec {
    pub description: Option<String>,
    pub timeout: Option<Duration>,
    pub composition: Composition,
    pub sub_agents: Vec<SubAgentReference>,
}

/// Validate a definition, defaulting parallel `maxWorkers` to 10.
pub fn validate(definition: &WorkflowDefinition) -> Result<WorkflowSpec, ValidationError> {
    validate_with_default_workers(definition, DEFAULT_MAX_WORKERS)
}

/// Validate a definition with a caller-supplied parallel worker default.
pub fn validate_with_default_workers(
    definition: &WorkflowDefinition,
    default_max_workers: u32,
) -> Result<WorkflowSpec, ValidationError> {
    let mut found = Vec::new();
    if definition.sequential.is_some() {
        found.push("sequential");
    }
    if definition.parallel.is_some() {
        found.push("parallel");
    }
    if definition.loop_.is_some() {
        found.push("loop");
    }
    if found.len() > 1 {
        return Err(ValidationError::MultipleCompositions { found });
    }

    let (composition, sub_agents) = if let Some(seq) = &definition.sequential {
        (Composition::Sequential, &seq.sub_agents)
    } else if let Some(par) = &definition.parallel {
        let value = par.max_workers.unwrap_or(default_max_workers);
        if !(1..=MAX_WORKERS).contains(&value) {
            return Err(ValidationError::MaxWorkers { value });
        }
        let max_workers = usize::try_from(value).map_err(|_| ValidationError::MaxWorkers { value })?;
        (Composition::Parallel { max_workers }, &par.sub_agents)
    } else if let Some(lp) = &definition.loop_ {
        if !(1..=MAX_ITERATIONS).contains(&lp.max_iterations) {
            return Err(ValidationError::MaxIterations {
                value: lp.max_iterations,
            });
        }
        (
            Composition::Loop {
                max_iterations: lp.max_iterations,
            },
            &lp.sub_agents,
        )
    } else {
        return Err(ValidationError::NoComposition);
    };

    validate_sub_agents(sub_agents)?;

    let timeout = definition
        .timeout
        .as_deref()
        .map(|value| {
            parse_duration(value).map_err(|reason| ValidationError::InvalidTimeout {
                value: value.to_string(),
                reason,
            })
        })
        .transpose()?;

    Ok(WorkflowSpec {
        description: definition.description.clone(),
        timeout,
        composition,
        sub_agents: sub_agents.clone(),
    })
}

fn validate_sub_agents(sub_agents: &[SubAgentReference]) -> Result<(), ValidationError> {
    let count = sub_agents.len();
    if !(MIN_SUB_AGENTS..=MAX_SUB_AGENTS).contains(&count) {
        return Err(ValidationError::SubAgentCount { count });
    }
    for (position, reference) in sub_agents.iter().enumerate() {
        if reference.name.trim().is_empty() {
            return Err(ValidationError::EmptySubAgentName { position });
        }
        if reference.kind != SUB_AGENT_KIND {
            return Err(ValidationError::UnsupportedKind {
                name: reference.name.clone(),
                kind: reference.kind.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::definition::{LoopDefinition, ParallelDefinition, SequentialDefinition};
    use super::*;

    fn agents(n: usize) -> Vec<SubAgentReference> {
        (0..n).map(|i| SubAgentReference::new(format!("agent-{i}"))).collect()
    }

    fn sequential(n: usize) -> WorkflowDefinition {
        WorkflowDefinition {
            sequential: Some(SequentialDefinition {
                sub_agents: agents(n),
            }),
            ..WorkflowDefinition::default()
        }
    }

    fn parallel(max_workers: Option<u32>) -> WorkflowDefinition {
        WorkflowDefinition {
            parallel: Some(ParallelDefinition {
                sub_agents: agents(3),
                max_workers,
            }),
            ..WorkflowDefinition::default()
        }
    }

    fn looped(max_iterations: u32) -> WorkflowDefinition {
        WorkflowDefinition {
            loop_: Some(LoopDefinition {
                sub_agents: agents(2),
                max_iterations,
            }),
            ..WorkflowDefinition::default()
        }
    }

    #[test]
    fn sub_agent_count_bounds() {
        assert_eq!(
            validate(&sequential(1)),
            Err(ValidationError::SubAgentCount { count: 1 })
        );
        assert!(validate(&sequential(2)).is_ok());
        assert!(validate(&sequential(50)).is_ok());
        assert_eq!(
            validate(&sequential(51)),
            Err(ValidationError::SubAgentCount { count: 51 })
        );
    }

    #[test]
    fn max_workers_bounds_and_default() {
        assert_eq!(
            validate(&parallel(Some(0))),
            Err(ValidationError::MaxWorkers { value: 0 })
        );
        assert_eq!(
            validate(&parallel(Some(51))),
            Err(ValidationError::MaxWorkers { value: 51 })
        );
        assert_eq!(
            validate(&parallel(Some(1))).unwrap().composition,
            Composition::Parallel { max_workers: 1 }
        );
        assert_eq!(
            validate(&parallel(Some(50))).unwrap().composition,
            Composition::Parallel { max_workers: 50 }
        );
        assert_eq!(
            validate(&parallel(None)).unwrap().composition,
            Composition::Parallel { max_workers: 10 }
        );
    }

    #[test]
    fn configured_worker_default_is_validated_too() {
        assert_eq!(
            validate_with_default_workers(&parallel(None), 4)
                .unwrap()
                .composition,
            Composition::Parallel { max_workers: 4 }
        );
        assert_eq!(
            validate_with_default_workers(&parallel(None), 0),
            Err(ValidationError::MaxWorkers { value: 0 })
        );
    }

    #[test]
    fn max_iterations_bounds() {
        assert_eq!(
            validate(&looped(0)),
            Err(ValidationError::MaxIterations { value: 0 })
        );
        assert_eq!(
            validate(&looped(101)),
            Err(ValidationError::MaxIterations { value: 101 })
        );
        assert!(validate(&looped(1)).is_ok());
        assert_eq!(
            validate(&looped(100)).unwrap().composition,
            Composition::Loop {
                max_iterations: 100
            }
        );
    }

    #[test]
    fn exactly_one_composition() {
        assert_eq!(
            validate(&WorkflowDefinition::default()),
            Err(ValidationError::NoComposition)
        );
        let mut both = sequential(2);
        both.loop_ = looped(1).loop_;
        assert_eq!(
            validate(&both),
            Err(ValidationError::MultipleCompositions {
                found: vec!["sequential", "loop"]
            })
        );
    }

    #[test]
    fn timeout_must_be_positive_duration() {
        let mut def = sequential(2);
        def.timeout = Some("200ms".into());
        assert_eq!(
            validate(&def).unwrap().timeout,
            Some(Duration::from_millis(200))
        );

        def.timeout = Some("0s".into());
        assert!(matches!(
            validate(&def),
            Err(ValidationError::InvalidTimeout {
                reason: DurationError::NotPositive,
                ..
            })
        ));

        def.timeout = Some("soon".into());
        assert!(matches!(
            validate(&def),
            Err(ValidationError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn rejects_empty_name_and_foreign_kind() {
        let mut def = sequential(2);
        if let Some(seq) = def.sequential.as_mut() {
            seq.sub_agents[1].name = "  ".into();
        }
        assert_eq!(
            validate(&def),
            Err(ValidationError::EmptySubAgentName { position: 1 })
        );

        let mut def = sequential(2);
        if let Some(seq) = def.sequential.as_mut() {
            seq.sub_agents[0].kind = "RemoteMCPServer".into();
        }
        assert!(matches!(
            validate(&def),
            Err(ValidationError::UnsupportedKind { .. })
        ));
    }
}
