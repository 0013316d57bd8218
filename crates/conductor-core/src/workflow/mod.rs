//! Workflow definitions and the validator.
//!
//! A [`WorkflowDefinition`] is the raw, externally supplied resource. The
//! validator turns it into a [`WorkflowSpec`] whose [`Composition`] is a
//! closed enum, so downstream code never re-checks structural rules.

mod definition;
mod duration;
mod validate;

pub use definition::{
    LoopDefinition, ParallelDefinition, SUB_AGENT_KIND, SequentialDefinition, SubAgentReference,
    WorkflowDefinition,
};
pub use duration::{DurationError, parse_duration};
pub use validate::{
    Composition, DEFAULT_MAX_WORKERS, MAX_ITERATIONS, MAX_SUB_AGENTS, MAX_WORKERS, MIN_SUB_AGENTS,
    ValidationError, WorkflowSpec, validate, validate_with_default_workers,
};
