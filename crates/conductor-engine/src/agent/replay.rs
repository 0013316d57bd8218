//! Scripted agent that replays a recorded delta stream.
//!
//! Used by the CLI to run workflows against NDJSON transcripts and by the
//! engine tests to drive deterministic scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use conductor_core::ndjson::{self, Delta};

use super::{Agent, AgentError, DeltaStream, InvokeRequest};

/// What happens after the scripted deltas run out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplayTail {
    /// The stream ends normally.
    #[default]
    Complete,
    /// The stream fails with a transport error.
    TransportError(String),
    /// The stream never ends; only cancellation or a deadline can stop it.
    Hang,
}

/// Agent that serves the same delta script on every call.
#[derive(Debug, Default)]
pub struct ReplayAgent {
    script: Vec<Delta>,
    delay: Option<Duration>,
    tail: ReplayTail,
    rejection: Option<AgentError>,
    calls: AtomicUsize,
    requests: Mutex<Vec<InvokeRequest>>,
}

impl ReplayAgent {
    pub fn new(script: Vec<Delta>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Agent answering with one text chunk and a `stop` signal.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Delta::text(text), Delta::finish("stop")])
    }

    /// Agent whose script is read from an NDJSON transcript.
    pub fn from_ndjson(content: &str) -> conductor_core::Result<Self> {
        Ok(Self::new(ndjson::parse_str(content)?))
    }

    /// Agent that refuses every call before any output.
    pub fn failing(error: AgentError) -> Self {
        Self {
            rejection: Some(error),
            ..Self::default()
        }
    }

    /// Sleep this long before each scripted delta.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn ending_with_error(mut self, message: impl Into<String>) -> Self {
        self.tail = ReplayTail::TransportError(message.into());
        self
    }

    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.tail = ReplayTail::Hang;
        self
    }

    /// Number of times the agent has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Agent for ReplayAgent {
    async fn invoke(&self, request: InvokeRequest) -> Result<DeltaStream, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let streaming = request.stream;
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(err) = &self.rejection {
            return Err(err.clone());
        }

        let script = if streaming {
            self.script.clone()
        } else {
            vec![Delta::complete(self.script.clone())]
        };
        let delay = self.delay;
        let tail = self.tail.clone();

        let stream = async_stream::stream! {
            for delta in script {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(delta);
            }
            match tail {
                ReplayTail::Complete => {}
                ReplayTail::TransportError(message) => yield Err(AgentError::Transport(message)),
                ReplayTail::Hang => std::future::pending::<()>().await,
            }
        };
        Ok(Box::pin(stream))
    }
}
