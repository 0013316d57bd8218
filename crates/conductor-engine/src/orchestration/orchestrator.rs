//! Composition state machines.
//!
//! The orchestrator validates a definition, creates the run's sessions and
//! schedules invocations. Sequential and loop runs share one session and run
//! one invocation at a time; parallel runs give every branch its own session
//! and bound concurrency with a [`WorkerPool`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use conductor_core::config::Config;
use conductor_core::event::{EventDraft, Status};
use conductor_core::workflow::{
    Composition, DEFAULT_MAX_WORKERS, SubAgentReference, WorkflowDefinition, WorkflowSpec,
    validate_with_default_workers,
};

use super::pool::WorkerPool;
use super::run::{RunHandle, StatusCell, WorkflowRun};
use super::stop::{LoopStopSignal, StopRecognizer};
use crate::agent::{Agent, AgentResolver, ResolveError};
use crate::error::OrchestratorError;
use crate::runner::{Invocation, InvocationContext, Runner};
use crate::session::{RunEvent, Session, SessionWriter};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Runs validated workflows against resolved agents.
#[derive(Clone)]
pub struct Orchestrator {
    resolver: Arc<dyn AgentResolver>,
    runner: Runner,
    default_max_workers: u32,
    event_capacity: usize,
    stop: Arc<dyn StopRecognizer>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runner", &self.runner)
            .field("default_max_workers", &self.default_max_workers)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(resolver: Arc<dyn AgentResolver>) -> Self {
        Self {
            resolver,
            runner: Runner::default(),
            default_max_workers: DEFAULT_MAX_WORKERS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            stop: Arc::new(LoopStopSignal::default()),
        }
    }

    /// Orchestrator using the engine and loop-stop settings from `config`.
    pub fn with_config(resolver: Arc<dyn AgentResolver>, config: &Config) -> Self {
        Self {
            resolver,
            runner: Runner::new(config.engine.streaming),
            default_max_workers: config.engine.default_max_workers,
            event_capacity: config.engine.event_capacity.max(1),
            stop: Arc::new(LoopStopSignal::from(&config.loop_stop)),
        }
    }

    #[must_use]
    pub fn with_stop_recognizer(mut self, stop: Arc<dyn StopRecognizer>) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.runner = Runner::new(streaming);
        self
    }

    /// Validate `definition` and start running it in the background.
    ///
    /// Validation failures are returned before anything is created.
    pub fn start(
        &self,
        definition: &WorkflowDefinition,
        task: impl Into<String>,
    ) -> Result<RunHandle, OrchestratorError> {
        let spec = validate_with_default_workers(definition, self.default_max_workers)?;
        let id = uuid::Uuid::new_v4().to_string();
        let (feed, events) = broadcast::channel(self.event_capacity);
        let (status, status_rx) = StatusCell::new();
        let cancel = CancellationToken::new();

        let started_at = Utc::now();
        let deadline = spec.timeout.map(|timeout| Instant::now() + timeout);
        let wall_deadline = spec
            .timeout
            .and_then(|t| TimeDelta::from_std(t).ok())
            .map(|t| started_at + t);
        let run = RunContext {
            id: id.clone(),
            started_at,
            wall_deadline,
            spec,
            task: task.into(),
            resolver: Arc::clone(&self.resolver),
            runner: self.runner,
            stop: Arc::clone(&self.stop),
            feed: feed.clone(),
            ctx: InvocationContext::new(cancel.clone(), deadline),
            status,
        };
        info!(
            run_id = %id,
            composition = run.spec.composition.name(),
            sub_agents = run.spec.sub_agents.len(),
            timeout = ?run.spec.timeout,
            "Starting workflow run"
        );
        let task = tokio::spawn(run.execute());
        Ok(RunHandle::new(id, status_rx, feed, events, cancel, task))
    }

    /// Start a run and wait for it to finish.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        task: impl Into<String>,
    ) -> Result<WorkflowRun, OrchestratorError> {
        self.start(definition, task)?.wait().await
    }
}

/// What a composition produced.
struct Outcome {
    status: Status,
    sessions: Vec<Session>,
    invocations: Vec<Invocation>,
}

/// Everything one run task owns.
struct RunContext {
    id: String,
    started_at: DateTime<Utc>,
    /// Wall-clock twin of the deadline in `ctx`, taken at the same moment.
    wall_deadline: Option<DateTime<Utc>>,
    spec: WorkflowSpec,
    task: String,
    resolver: Arc<dyn AgentResolver>,
    runner: Runner,
    stop: Arc<dyn StopRecognizer>,
    feed: broadcast::Sender<RunEvent>,
    ctx: InvocationContext,
    status: StatusCell,
}

impl RunContext {
    async fn execute(self) -> WorkflowRun {
        self.status.transition(&self.id, Status::Running);

        let outcome = match self.spec.composition {
            Composition::Sequential => self.run_shared(None).await,
            Composition::Loop { max_iterations } => self.run_shared(Some(max_iterations)).await,
            Composition::Parallel { max_workers } => self.run_parallel(max_workers).await,
        };

        self.status.transition(&self.id, outcome.status);
        let status = self.status.get();
        info!(
            run_id = %self.id,
            %status,
            invocations = outcome.invocations.len(),
            "Workflow run finished"
        );

        WorkflowRun {
            id: self.id,
            spec: self.spec,
            task: self.task,
            status,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
            deadline: self.wall_deadline,
            sessions: outcome.sessions,
            invocations: outcome.invocations,
        }
    }

    fn new_session(&self) -> (Session, SessionWriter) {
        let (session, writer) = Session::create();
        (session, writer.with_feed(self.feed.clone()))
    }

    /// Sequential run, or a loop of sequential passes when `max_iterations`
    /// is set. One shared session, one invocation at a time.
    async fn run_shared(&self, max_iterations: Option<u32>) -> Outcome {
        let (session, mut writer) = self.new_session();
        let mut invocations = Vec::new();
        let finish = |status, invocations| Outcome {
            status,
            sessions: vec![session.clone()],
            invocations,
        };

        let Some(agents) = self.resolve_all(&mut writer) else {
            return finish(Status::Failed, invocations);
        };

        for iteration in 1..=max_iterations.unwrap_or(1) {
            for (reference, agent) in self.spec.sub_agents.iter().zip(&agents) {
                if let Some(status) = self.ctx.interruption() {
                    info!(run_id = %self.id, %status, "Run interrupted between steps");
                    return finish(status, invocations);
                }

                let mut invocation = Invocation::new(reference.clone(), session.id());
                if max_iterations.is_some() {
                    invocation = invocation.in_iteration(iteration);
                }
                let outcome = self
                    .runner
                    .run(
                        agent.as_ref(),
                        &mut invocation,
                        &mut writer,
                        &self.task,
                        &self.ctx,
                    )
                    .await;
                invocations.push(invocation);

                if outcome.status != Status::Succeeded {
                    warn!(
                        run_id = %self.id,
                        agent = %reference,
                        status = %outcome.status,
                        "Step did not succeed, aborting remaining steps"
                    );
                    return finish(outcome.status, invocations);
                }

                if max_iterations.is_some()
                    && outcome
                        .response
                        .as_ref()
                        .is_some_and(|r| self.stop.should_stop(r))
                {
                    info!(run_id = %self.id, iteration, agent = %reference, "Loop stop requested");
                    return finish(Status::Succeeded, invocations);
                }
            }
        }
        finish(Status::Succeeded, invocations)
    }

    /// Resolve every sub-agent up front. The first failure is recorded as an
    /// error event authored by that sub-agent.
    fn resolve_all(&self, writer: &mut SessionWriter) -> Option<Vec<Arc<dyn Agent>>> {
        let mut agents = Vec::with_capacity(self.spec.sub_agents.len());
        for reference in &self.spec.sub_agents {
            match self.resolver.resolve(reference) {
                Ok(agent) => agents.push(agent),
                Err(err) => {
                    error!(run_id = %self.id, agent = %reference, error = %err, "Sub-agent resolution failed");
                    writer.append(EventDraft::error(reference.qualified_name(), err.to_string()));
                    return None;
                }
            }
        }
        Some(agents)
    }

    /// Parallel fan-out: one isolated session per branch, at most
    /// `max_workers` branches running at once.
    async fn run_parallel(&self, max_workers: usize) -> Outcome {
        let pool = Arc::new(WorkerPool::new(max_workers));
        let mut branches = JoinSet::new();
        let mut branch_of = HashMap::new();
        let mut sessions = Vec::with_capacity(self.spec.sub_agents.len());
        let mut slots: Vec<Option<Invocation>> = vec![None; self.spec.sub_agents.len()];

        for (index, reference) in self.spec.sub_agents.iter().enumerate() {
            let (session, writer) = self.new_session();
            sessions.push(session);
            let branch = Branch {
                reference: reference.clone(),
                agent: self.resolver.resolve(reference),
                writer,
                pool: Arc::clone(&pool),
                runner: self.runner,
                task: self.task.clone(),
                ctx: self.ctx.clone(),
            };
            let handle = branches.spawn(branch.run());
            branch_of.insert(handle.id(), index);
        }

        while let Some(joined) = branches.join_next_with_id().await {
            match joined {
                Ok((id, invocation)) => {
                    if let Some(&index) = branch_of.get(&id) {
                        slots[index] = Some(invocation);
                    }
                }
                Err(err) => {
                    error!(run_id = %self.id, error = %err, "Parallel branch task failed");
                    if let Some(&index) = branch_of.get(&err.id()) {
                        let mut invocation = Invocation::new(
                            self.spec.sub_agents[index].clone(),
                            sessions[index].id(),
                        );
                        invocation.transition(Status::Failed);
                        slots[index] = Some(invocation);
                    }
                }
            }
        }

        let invocations: Vec<Invocation> = slots.into_iter().flatten().collect();
        let status = self.parallel_status(&invocations);
        Outcome {
            status,
            sessions,
            invocations,
        }
    }

    /// TimedOut if the deadline cut any branch short, Cancelled on external
    /// cancellation, otherwise Succeeded if any branch succeeded.
    fn parallel_status(&self, invocations: &[Invocation]) -> Status {
        let any = |status| invocations.iter().any(|i| i.status == status);
        if any(Status::TimedOut) || (any(Status::Cancelled) && self.ctx.deadline_passed()) {
            Status::TimedOut
        } else if self.ctx.cancel.is_cancelled() && any(Status::Cancelled) {
            Status::Cancelled
        } else if any(Status::Succeeded) {
            Status::Succeeded
        } else {
            Status::Failed
        }
    }
}

/// One parallel branch, owning its session writer.
struct Branch {
    reference: SubAgentReference,
    agent: Result<Arc<dyn Agent>, ResolveError>,
    writer: SessionWriter,
    pool: Arc<WorkerPool>,
    runner: Runner,
    task: String,
    ctx: InvocationContext,
}

impl Branch {
    async fn run(self) -> Invocation {
        let Self {
            reference,
            agent,
            mut writer,
            pool,
            runner,
            task,
            ctx,
        } = self;
        let mut invocation = Invocation::new(reference, writer.session_id());

        let agent = match agent {
            Ok(agent) => agent,
            Err(err) => {
                error!(agent = %invocation.agent, error = %err, "Sub-agent resolution failed");
                let author = invocation.author();
                invocation.transition(Status::Failed);
                writer.append(EventDraft::error(&author, err.to_string()));
                writer.append(EventDraft::status(&author, &invocation.id, Status::Failed));
                return invocation;
            }
        };

        let _permit = match pool.acquire(&ctx).await {
            Ok(permit) => permit,
            Err(err) => {
                info!(agent = %invocation.agent, reason = %err, "Branch never got a worker slot");
                invocation.transition(Status::Cancelled);
                return invocation;
            }
        };

        runner
            .run(agent.as_ref(), &mut invocation, &mut writer, &task, &ctx)
            .await;
        invocation
    }
}
