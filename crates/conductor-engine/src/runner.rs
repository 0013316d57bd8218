//! Invocation runner.
//!
//! Runs one sub-agent call against one session: opens the model call, feeds
//! every delta to a fresh [`AggregatorState`], appends what the aggregator
//! produces and maps the outcome to a terminal [`Status`]. Failures never
//! escape as errors; they end up as events and a status.

use std::future::Future;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conductor_core::event::{EventDraft, EventKind, EventPayload, Response, Status};
use conductor_core::workflow::SubAgentReference;

use crate::agent::{Agent, InvokeRequest};
use crate::session::SessionWriter;
use crate::stream::{AggregatorState, StreamEnd};

/// One sub-agent's execution attempt inside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub id: String,
    pub agent: SubAgentReference,
    pub session_id: String,
    /// Loop iteration, counted from 1. `None` outside loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Invocation {
    pub fn new(agent: SubAgentReference, session_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent,
            session_id: session_id.into(),
            iteration: None,
            status: Status::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    #[must_use]
    pub const fn in_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Move to `status`. Terminal statuses are final; later transitions are
    /// ignored.
    pub fn transition(&mut self, status: Status) -> bool {
        if self.status.is_terminal() {
            warn!(
                invocation_id = %self.id,
                from = %self.status,
                to = %status,
                "Ignoring transition out of terminal status"
            );
            return false;
        }
        let now = Utc::now();
        if status == Status::Running {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = status;
        true
    }

    /// Author name used on events this invocation appends.
    pub fn author(&self) -> String {
        self.agent.qualified_name()
    }
}

/// Cancellation and deadline shared by every invocation of a run.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the deadline is reached; never resolves without one.
    pub fn deadline_reached(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        }
    }

    /// Status for work that was stopped before it finished, if it was.
    pub fn interruption(&self) -> Option<Status> {
        if self.deadline_passed() {
            Some(Status::TimedOut)
        } else if self.cancel.is_cancelled() {
            Some(Status::Cancelled)
        } else {
            None
        }
    }
}

/// Terminal result of one invocation.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub status: Status,
    /// The assembled response, when the final event was not an error.
    pub response: Option<Response>,
}

enum Interrupt {
    Cancelled,
    Deadline,
}

impl Interrupt {
    const fn status(&self) -> Status {
        match self {
            Self::Cancelled => Status::Cancelled,
            Self::Deadline => Status::TimedOut,
        }
    }
}

/// Executes invocations.
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    streaming: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self { streaming: true }
    }
}

impl Runner {
    pub const fn new(streaming: bool) -> Self {
        Self { streaming }
    }

    /// Run `invocation` to a terminal status, appending every event to
    /// `writer`.
    pub async fn run(
        &self,
        agent: &dyn Agent,
        invocation: &mut Invocation,
        writer: &mut SessionWriter,
        task: &str,
        ctx: &InvocationContext,
    ) -> InvocationOutcome {
        let author = invocation.author();
        invocation.transition(Status::Running);
        writer.append(EventDraft::status(&author, &invocation.id, Status::Running));
        info!(
            invocation_id = %invocation.id,
            session_id = %writer.session_id(),
            agent = %author,
            "Invocation started"
        );

        let request = InvokeRequest {
            task: task.to_string(),
            history: writer.session().snapshot(),
            stream: self.streaming,
        };

        let mut state = AggregatorState::new(&author);
        let deadline = ctx.deadline_reached();
        tokio::pin!(deadline);

        let opened = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(Interrupt::Cancelled),
            () = &mut deadline => Err(Interrupt::Deadline),
            result = agent.invoke(request) => Ok(result),
        };

        let (end, interrupt) = match opened {
            Err(interrupt) => (StreamEnd::Cancelled, Some(interrupt)),
            Ok(Err(err)) => {
                warn!(invocation_id = %invocation.id, agent = %author, error = %err, "Model call failed to open");
                (StreamEnd::TransportError(err.to_string()), None)
            }
            Ok(Ok(mut stream)) => {
                let ended = loop {
                    tokio::select! {
                        biased;
                        () = ctx.cancel.cancelled() => break (StreamEnd::Cancelled, Some(Interrupt::Cancelled)),
                        () = &mut deadline => break (StreamEnd::Cancelled, Some(Interrupt::Deadline)),
                        item = stream.next() => match item {
                            Some(Ok(delta)) => {
                                if let Some(partial) = state.push(delta) {
                                    writer.append(partial);
                                }
                            }
                            Some(Err(err)) => {
                                warn!(invocation_id = %invocation.id, agent = %author, error = %err, "Model stream failed");
                                break (StreamEnd::TransportError(err.to_string()), None);
                            }
                            None => break (StreamEnd::Completed, None),
                        },
                    }
                };
                // Closes the upstream call.
                drop(stream);
                ended
            }
        };

        let final_event = state.finish(end);
        let status = match (&interrupt, final_event.kind) {
            (Some(interrupt), _) => interrupt.status(),
            (None, EventKind::Error) => Status::Failed,
            (None, _) => Status::Succeeded,
        };
        let response = match &final_event.payload {
            EventPayload::Response(response) => Some(response.clone()),
            _ => None,
        };
        let sequence = writer.append(final_event);
        debug!(invocation_id = %invocation.id, sequence, "Final event appended");

        invocation.transition(status);
        writer.append(EventDraft::status(&author, &invocation.id, status));
        info!(
            invocation_id = %invocation.id,
            agent = %author,
            %status,
            "Invocation finished"
        );

        InvocationOutcome { status, response }
    }
}
