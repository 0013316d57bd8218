//! Run records and handles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use conductor_core::event::Status;
use conductor_core::workflow::WorkflowSpec;

use crate::error::OrchestratorError;
use crate::runner::Invocation;
use crate::session::{RunEvent, Session};

/// One execution of a workflow against one task.
///
/// Returned once the run is terminal; sessions stay readable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub id: String,
    pub spec: WorkflowSpec,
    pub task: String,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    /// One shared session for sequential and loop runs, one per branch for
    /// parallel runs.
    pub sessions: Vec<Session>,
    /// Invocations in scheduling order.
    pub invocations: Vec<Invocation>,
}

impl WorkflowRun {
    /// Invocations that reached a given status.
    pub fn invocations_with(&self, status: Status) -> impl Iterator<Item = &Invocation> {
        self.invocations.iter().filter(move |i| i.status == status)
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }
}

/// Run status shared between the run task and its handle.
///
/// The first terminal status sticks; later ones are dropped.
#[derive(Debug, Clone)]
pub(crate) struct StatusCell {
    tx: Arc<watch::Sender<Status>>,
}

impl StatusCell {
    pub(crate) fn new() -> (Self, watch::Receiver<Status>) {
        let (tx, rx) = watch::channel(Status::Pending);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub(crate) fn get(&self) -> Status {
        *self.tx.borrow()
    }

    /// Apply a transition unless the status is already terminal.
    pub(crate) fn transition(&self, run_id: &str, status: Status) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(run_id, %status, "Workflow run status changed");
        }
        changed
    }
}

/// Live handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    id: String,
    status: watch::Receiver<Status>,
    feed: broadcast::Sender<RunEvent>,
    events: Option<broadcast::Receiver<RunEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<WorkflowRun>,
}

impl RunHandle {
    pub(crate) fn new(
        id: String,
        status: watch::Receiver<Status>,
        feed: broadcast::Sender<RunEvent>,
        events: broadcast::Receiver<RunEvent>,
        cancel: CancellationToken,
        task: JoinHandle<WorkflowRun>,
    ) -> Self {
        Self {
            id,
            status,
            feed,
            events: Some(events),
            cancel,
            task,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current run status.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Receiver notified on every run status change.
    pub fn status_changes(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Subscribe to events appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.feed.subscribe()
    }

    /// Every event of the run, from the first one.
    ///
    /// The first call returns a subscription taken before the run started.
    /// Later calls fall back to [`RunHandle::subscribe`].
    pub fn events(&mut self) -> broadcast::Receiver<RunEvent> {
        self.events.take().unwrap_or_else(|| self.feed.subscribe())
    }

    /// Ask the run to stop. In-flight invocations end `Cancelled`.
    pub fn cancel(&self) {
        info!(run_id = %self.id, "Cancelling workflow run");
        self.cancel.cancel();
    }

    /// Wait for the run to become terminal.
    pub async fn wait(self) -> Result<WorkflowRun, OrchestratorError> {
        self.task
            .await
            .map_err(|e| OrchestratorError::Aborted(e.to_string()))
    }
}
