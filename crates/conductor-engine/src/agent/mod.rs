//! Agent backends and sub-agent resolution.
//!
//! The engine never talks to a model provider directly. It resolves each
//! [`SubAgentReference`] to an [`Agent`] through an [`AgentResolver`] and
//! consumes the [`DeltaStream`] the agent returns.

mod registry;
mod replay;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use conductor_core::event::Event;
use conductor_core::ndjson::Delta;
use conductor_core::workflow::SubAgentReference;

pub use registry::AgentRegistry;
pub use replay::{ReplayAgent, ReplayTail};

/// Stream of provider deltas for one model call.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, AgentError>> + Send>>;

/// Input handed to an agent for one invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// The inbound task the workflow was started with.
    pub task: String,
    /// Snapshot of the bound session when the invocation started.
    pub history: Vec<Event>,
    /// Whether the caller wants incremental deltas. Non-streaming agents
    /// answer with a single delta carrying the whole response.
    pub stream: bool,
}

/// Errors reported by an agent backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),
}

/// An invocable sub-agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Open a model call. Dropping the returned stream closes it.
    async fn invoke(&self, request: InvokeRequest) -> Result<DeltaStream, AgentError>;
}

/// Failure to turn a reference into an agent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("Sub-agent not found: {reference}")]
    NotFound { reference: String },

    #[error("Sub-agent {reference} cannot be used: {reason}")]
    Unusable { reference: String, reason: String },
}

/// Resolves sub-agent references to invocable agents.
pub trait AgentResolver: Send + Sync {
    fn resolve(&self, reference: &SubAgentReference) -> Result<Arc<dyn Agent>, ResolveError>;
}
