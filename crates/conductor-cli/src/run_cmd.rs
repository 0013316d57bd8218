//! `conductor run`: execute a workflow and stream its events as JSON lines.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};

use conductor_core::Config;
use conductor_core::event::Status;
use conductor_engine::{Orchestrator, RunEvent, RunHandle, WorkflowRun};

use crate::transcripts;

/// Arguments of `conductor run`.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub workflow: PathBuf,
    pub task: String,
    pub transcripts: PathBuf,
}

/// Run the workflow and return its terminal status.
pub async fn run(args: &RunArgs, config: &Config) -> anyhow::Result<Status> {
    let definition = crate::load_definition(&args.workflow)?;
    let registry = transcripts::load_registry(&args.transcripts)?;
    let orchestrator = Orchestrator::with_config(Arc::new(registry), config);

    let handle = orchestrator.start(&definition, args.task.clone())?;
    info!(run_id = %handle.id(), workflow = %args.workflow.display(), "Workflow started");

    let mut out = io::stdout();
    let run = stream_run(handle, &mut out).await?;
    writeln!(out, "{}", summary(&run))?;
    Ok(run.status)
}

/// Print every event of the run as a JSON line, then return the finished run.
///
/// Events the live feed dropped are printed from the session logs once the
/// run is over.
async fn stream_run(mut handle: RunHandle, out: &mut impl Write) -> anyhow::Result<WorkflowRun> {
    let mut events = handle.events();
    let mut status = handle.status_changes();
    let mut printed = HashSet::new();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_event(out, &event, &mut printed)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event feed lagged, replaying from session log"),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() || status.borrow_and_update().is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling run");
                handle.cancel();
            }
        }
    }

    // Events appended before the terminal status are already buffered.
    loop {
        match events.try_recv() {
            Ok(event) => print_event(out, &event, &mut printed)?,
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Event feed lagged, replaying from session log"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    let run = handle.wait().await?;
    for session in &run.sessions {
        for event in session.snapshot() {
            let event = RunEvent {
                session_id: session.id().to_string(),
                event,
            };
            print_event(out, &event, &mut printed)?;
        }
    }
    Ok(run)
}

/// Print `event` unless it was printed already.
fn print_event(
    out: &mut impl Write,
    event: &RunEvent,
    printed: &mut HashSet<(String, u64)>,
) -> anyhow::Result<()> {
    if printed.insert((event.session_id.clone(), event.event.sequence)) {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    Ok(())
}

/// One-line JSON summary of a finished run.
pub fn summary(run: &WorkflowRun) -> serde_json::Value {
    json!({
        "run_id": run.id,
        "status": run.status,
        "composition": run.spec.composition.name(),
        "started_at": run.started_at,
        "finished_at": run.finished_at,
        "sessions": run.sessions.iter().map(|s| json!({ "id": s.id(), "events": s.len() })).collect::<Vec<_>>(),
        "invocations": run.invocations,
    })
}
