//! `Conductor` Engine
//!
//! Async runtime pieces of the workflow engine:
//! - Session & event log with single-writer appends
//! - Streaming response aggregation
//! - The invocation runner
//! - Sequential, parallel and loop orchestration

pub mod agent;
pub mod error;
pub mod orchestration;
pub mod runner;
pub mod session;
pub mod stream;

pub use agent::{
    Agent, AgentError, AgentRegistry, AgentResolver, DeltaStream, InvokeRequest, ResolveError,
};
pub use error::OrchestratorError;
pub use orchestration::{Orchestrator, RunHandle, WorkflowRun};
pub use runner::{Invocation, InvocationContext, InvocationOutcome, Runner};
pub use session::{RunEvent, Session, SessionWriter};
pub use stream::{AggregatorState, StreamEnd};
