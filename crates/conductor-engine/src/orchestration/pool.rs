//! Semaphore-based worker pool for parallel branches.
//!
//! At most `max_workers` permits are out at once. Waiting for a permit is a
//! suspension point, so [`WorkerPool::acquire`] also watches the run's
//! cancellation token and deadline.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::runner::InvocationContext;

/// A permit granting the right to run one branch.
///
/// When dropped, the permit is automatically returned to the pool.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounded pool of branch slots.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    /// Create a pool with `max_workers` slots (at least one).
    pub fn new(max_workers: usize) -> Self {
        let limit = max_workers.max(1);
        info!(max_workers = limit, "WorkerPool created");
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            max_workers: limit,
        }
    }

    /// Wait for a slot, giving up on cancellation or deadline.
    pub async fn acquire(&self, ctx: &InvocationContext) -> Result<WorkerPermit, PoolError> {
        let deadline = ctx.deadline_reached();
        let permit = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(PoolError::Cancelled),
            () = deadline => return Err(PoolError::DeadlineExceeded),
            // The semaphore is never closed.
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| PoolError::Cancelled)?
            }
        };
        debug!(available = self.available_permits(), "Worker slot acquired");
        Ok(WorkerPermit { _permit: permit })
    }

    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of free slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Errors from the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Run was cancelled while waiting for a worker slot")]
    Cancelled,

    #[error("Run deadline passed while waiting for a worker slot")]
    DeadlineExceeded,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::*;

    async fn take(pool: &WorkerPool) -> WorkerPermit {
        pool.acquire(&InvocationContext::default()).await.unwrap()
    }

    #[tokio::test]
    async fn zero_workers_still_gives_one_slot() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.max_workers(), 1);
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    #[allow(clippy::significant_drop_tightening)]
    async fn permits_return_on_drop() {
        let pool = WorkerPool::new(2);
        let first = take(&pool).await;
        let second = take(&pool).await;
        assert_eq!(pool.available_permits(), 0);
        drop((first, second));
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn acquire_waits_for_released_slot() {
        let pool = Arc::new(WorkerPool::new(1));
        let permit = take(&pool).await;

        let pool_clone = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            pool_clone
                .acquire(&InvocationContext::default())
                .await
                .map(|_| ())
        });

        drop(permit);
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("acquire should complete after permit released")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn acquire_gives_up_on_cancel() {
        let pool = WorkerPool::new(1);
        let _held = take(&pool).await;
        let ctx = InvocationContext::new(CancellationToken::new(), None);
        ctx.cancel.cancel();
        assert_eq!(pool.acquire(&ctx).await.err(), Some(PoolError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_wins_over_free_slot() {
        let pool = WorkerPool::new(1);
        let ctx = InvocationContext::new(CancellationToken::new(), None);
        ctx.cancel.cancel();
        assert_eq!(pool.acquire(&ctx).await.err(), Some(PoolError::Cancelled));
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_gives_up_at_deadline() {
        let pool = WorkerPool::new(1);
        let _held = take(&pool).await;
        let ctx = InvocationContext::new(
            CancellationToken::new(),
            Some(Instant::now() + Duration::from_millis(50)),
        );
        assert_eq!(
            pool.acquire(&ctx).await.err(),
            Some(PoolError::DeadlineExceeded)
        );
    }
}
