//! Worker pool lifecycle: start, submission, recovery and shutdown.

use std::sync::Arc;
use std::time::Duration;

use common::OrderNumber;
use order_store::OrderStore;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::AccrualClient;
use crate::error::{AccrualError, Result};
use crate::queue::{RateLimitSignal, WorkItem, WorkQueue};
use crate::retry::RetryPolicy;
use crate::worker::{PoolShared, Worker};

/// Pool sizing and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Upper bound for a `Retry-After` cooldown.
    pub max_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            retry: RetryPolicy::default(),
            max_cooldown: Self::DEFAULT_MAX_COOLDOWN,
        }
    }
}

impl PoolConfig {
    pub const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(300);

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_cooldown(mut self, max_cooldown: Duration) -> Self {
        self.max_cooldown = max_cooldown;
        self
    }
}

/// Handle used to hand freshly created orders to the pool.
#[derive(Debug, Clone)]
pub struct Submitter {
    queue: WorkQueue,
    shutdown: CancellationToken,
}

impl Submitter {
    /// Enqueues an order for checking, waiting while the queue is full.
    ///
    /// Fails with `PoolClosed` once the pool shuts down.
    pub async fn submit(&self, number: OrderNumber) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(AccrualError::PoolClosed);
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(AccrualError::PoolClosed),
            result = self.queue.push(WorkItem::new(number)) => result,
        }
    }

    /// Number of orders waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// A fixed set of accrual workers sharing one queue and one rate-limit signal.
///
/// Dropping the pool cancels its workers; call [`WorkerPool::shutdown`] to
/// also wait for them.
pub struct WorkerPool<S, C> {
    shared: Arc<PoolShared<S, C>>,
    workers: Vec<JoinHandle<()>>,
}

impl<S, C> WorkerPool<S, C>
where
    S: OrderStore + 'static,
    C: AccrualClient + 'static,
{
    /// Builds the queue and signal and spawns `config.workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: S, client: C, config: PoolConfig) -> Self {
        let queue = WorkQueue::new(config.queue_capacity);
        let shared = Arc::new(PoolShared {
            store,
            client,
            deferred: Arc::new(Semaphore::new(queue.capacity())),
            queue,
            signal: RateLimitSignal::new(config.workers),
            retry: config.retry,
            max_cooldown: config.max_cooldown,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        let workers = (0..config.workers)
            .map(|id| tokio::spawn(Worker::new(id, Arc::clone(&shared)).run()))
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = shared.queue.capacity(),
            max_retries = config.retry.max_attempts,
            max_cooldown = ?config.max_cooldown,
            "accrual worker pool started"
        );

        Self { shared, workers }
    }

    /// Returns a worker bound to this pool that is not spawned.
    ///
    /// Callers drive it with [`Worker::step`].
    pub fn detached_worker(&self) -> Worker<S, C> {
        Worker::new(self.workers.len(), Arc::clone(&self.shared))
    }

    pub fn submitter(&self) -> Submitter {
        Submitter {
            queue: self.shared.queue.clone(),
            shutdown: self.shared.shutdown.clone(),
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.shared.queue
    }

    pub fn rate_limit_signal(&self) -> &RateLimitSignal {
        &self.shared.signal
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Re-enqueues currently parked on a full queue.
    ///
    /// Never exceeds the queue capacity; once that many are parked, workers
    /// wait for queue space themselves.
    pub fn deferred_requeues(&self) -> usize {
        self.shared.queue.capacity() - self.shared.deferred.available_permits()
    }

    /// Enqueues every order the store still lists as pending.
    ///
    /// Returns the number of orders enqueued.
    #[tracing::instrument(skip(self))]
    pub async fn recover_pending(&self) -> Result<usize> {
        let pending = self.shared.store.list_pending().await?;
        let submitter = self.submitter();
        for number in &pending {
            submitter.submit(*number).await?;
        }

        tracing::info!(count = pending.len(), "re-enqueued pending orders");
        Ok(pending.len())
    }

    /// Stops the pool and waits for every worker and deferred task to exit.
    ///
    /// In-flight polls are allowed to finish; queued items are abandoned and
    /// stay pending in the store. Returns the number of abandoned items.
    pub async fn shutdown(mut self) -> usize {
        self.shared.shutdown.cancel();
        self.shared.tasks.close();

        let workers = std::mem::take(&mut self.workers);
        for result in futures_util::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "accrual worker failed");
            }
        }
        self.shared.tasks.wait().await;

        let abandoned = self.shared.queue.drain().await;
        for item in &abandoned {
            tracing::debug!(number = %item.number, "abandoning queued order");
        }
        tracing::info!(abandoned = abandoned.len(), "accrual worker pool stopped");
        abandoned.len()
    }
}

impl<S, C> Drop for WorkerPool<S, C> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
