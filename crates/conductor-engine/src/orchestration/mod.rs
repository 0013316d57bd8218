//! Workflow orchestration: worker pool, loop stop recognition, run handles
//! and the composition state machines.
//!
//! - [`WorkerPool`]: Semaphore-based bound on concurrently running parallel
//!   branches.
//! - [`StopRecognizer`]: Decides whether a loop iteration asked to stop.
//! - [`RunHandle`] / [`WorkflowRun`]: Live and final views of one run.
//! - [`Orchestrator`]: Validates a definition and drives its composition.

pub mod orchestrator;
pub mod pool;
pub mod run;
pub mod stop;

pub use orchestrator::Orchestrator;
pub use pool::{PoolError, WorkerPermit, WorkerPool};
pub use run::{RunHandle, WorkflowRun};
pub use stop::{LoopStopSignal, NeverStop, StopRecognizer};
