//! The poll loop run by each pool worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::OrderNumber;
use order_store::{Order, OrderStatus, OrderStore, StoreError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::{AccrualClient, AccrualResponse, Outcome};
use crate::error::{AccrualError, Result};
use crate::queue::{RateLimitSignal, WorkItem, WorkQueue};
use crate::retry::RetryPolicy;

/// State shared by every worker of one pool.
pub(crate) struct PoolShared<S, C> {
    pub(crate) store: S,
    pub(crate) client: C,
    pub(crate) queue: WorkQueue,
    pub(crate) signal: RateLimitSignal,
    pub(crate) retry: RetryPolicy,
    pub(crate) max_cooldown: Duration,
    pub(crate) shutdown: CancellationToken,
    /// Deferred re-enqueues and delayed retries.
    pub(crate) tasks: TaskTracker,
    /// One permit per deferred re-enqueue; sized to the queue capacity.
    pub(crate) deferred: Arc<Semaphore>,
}

/// What happened to an order during one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A terminal status was written.
    Finished(OrderStatus),
    /// The order is still pending or was throttled and went back on the queue.
    Requeued,
    /// The order was already terminal; nothing was written.
    Skipped,
    /// A transient failure; the order is re-submitted after the delay.
    RetryScheduled(Duration),
    /// The check was abandoned for this cycle.
    Dropped,
}

impl Disposition {
    fn label(&self) -> &'static str {
        match self {
            Disposition::Finished(OrderStatus::Processed) => "processed",
            Disposition::Finished(_) => "invalid",
            Disposition::Requeued => "requeued",
            Disposition::Skipped => "skipped",
            Disposition::RetryScheduled(_) => "retry",
            Disposition::Dropped => "dropped",
        }
    }
}

/// Result of a single worker iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Polled {
        number: OrderNumber,
        disposition: Disposition,
    },
    /// The worker consumed a cooldown and slept through it.
    CooledDown(Duration),
    Shutdown,
}

/// A single poller of the accrual pool.
pub struct Worker<S, C> {
    id: usize,
    shared: Arc<PoolShared<S, C>>,
}

impl<S, C> Worker<S, C>
where
    S: OrderStore + 'static,
    C: AccrualClient + 'static,
{
    pub(crate) fn new(id: usize, shared: Arc<PoolShared<S, C>>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs iterations until the pool shuts down.
    #[tracing::instrument(skip(self), fields(worker = self.id))]
    pub async fn run(self) {
        tracing::debug!("accrual worker started");
        while self.step().await != Step::Shutdown {}
        tracing::debug!("accrual worker stopped");
    }

    /// Waits for the next work item, cooldown or shutdown and handles it.
    pub async fn step(&self) -> Step {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Step::Shutdown;
        }

        tokio::select! {
            _ = shared.shutdown.cancelled() => Step::Shutdown,
            Some(cooldown) = shared.signal.recv() => self.cool_down(cooldown).await,
            Some(item) = shared.queue.pop() => {
                let number = item.number;
                let disposition = self.process(item).await;
                Step::Polled { number, disposition }
            }
            else => Step::Shutdown,
        }
    }

    async fn cool_down(&self, cooldown: Duration) -> Step {
        metrics::counter!("accrual_cooldowns_total").increment(1);
        tracing::info!(worker = self.id, ?cooldown, "accrual service throttled, pausing");

        tokio::select! {
            _ = self.shared.shutdown.cancelled() => Step::Shutdown,
            _ = tokio::time::sleep(cooldown) => Step::CooledDown(cooldown),
        }
    }

    async fn process(&self, item: WorkItem) -> Disposition {
        let number = item.number;
        let disposition = match self.poll(number).await {
            Ok(disposition) => disposition,
            Err(err) if err.is_transient() => self.schedule_retry(item, &err),
            Err(err) => {
                tracing::warn!(%number, error = %err, "dropping accrual check");
                Disposition::Dropped
            }
        };

        metrics::counter!("accrual_polls_total", "outcome" => disposition.label()).increment(1);
        disposition
    }

    /// One read, at most one HTTP query, at most one write.
    async fn poll(&self, number: OrderNumber) -> Result<Disposition> {
        let Some(mut order) = self.shared.store.get_by_number(number).await? else {
            return Err(AccrualError::UnknownOrder(number));
        };
        if order.status.is_terminal() {
            tracing::debug!(%number, status = %order.status, "order already terminal");
            return Ok(Disposition::Skipped);
        }

        let started = Instant::now();
        let outcome = self.shared.client.query(number).await;
        metrics::histogram!("accrual_query_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match outcome? {
            Outcome::NotFound => {
                order.mark_invalid();
                self.persist(&order).await
            }
            Outcome::Throttled { retry_after } => {
                match retry_after {
                    Some(cooldown) => {
                        let cooldown = self.clamp_cooldown(number, cooldown);
                        if !self.shared.signal.raise(cooldown) {
                            tracing::debug!(%number, "cooldown already pending, dropping");
                        }
                    }
                    None => tracing::warn!(%number, "throttled without a usable Retry-After"),
                }
                Ok(self.requeue(WorkItem::new(number)).await)
            }
            Outcome::Ready(response) => self.apply(order, response).await,
        }
    }

    async fn apply(&self, mut order: Order, response: AccrualResponse) -> Result<Disposition> {
        match response.status.local_status() {
            Some(OrderStatus::Processed) => {
                let accrual = response.accrual.unwrap_or_default();
                if accrual < 0.0 {
                    return Err(AccrualError::NegativeAccrual(accrual));
                }
                order.mark_processed(accrual);
                self.persist(&order).await
            }
            Some(OrderStatus::Invalid) => {
                order.mark_invalid();
                self.persist(&order).await
            }
            Some(OrderStatus::New | OrderStatus::Processing) => {
                if order.mark_processing() {
                    match self.shared.store.update(&order).await {
                        Ok(()) => {}
                        Err(StoreError::TerminalStatus { status, .. }) => {
                            tracing::debug!(number = %order.number, %status, "order finished concurrently");
                            return Ok(Disposition::Skipped);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(self.requeue(WorkItem::new(order.number)).await)
            }
            None => {
                tracing::warn!(
                    number = %order.number,
                    remote_status = ?response.status,
                    "unknown accrual status, checking again later"
                );
                Ok(self.requeue(WorkItem::new(order.number)).await)
            }
        }
    }

    async fn persist(&self, order: &Order) -> Result<Disposition> {
        match self.shared.store.update(order).await {
            Ok(()) => {
                tracing::info!(
                    number = %order.number,
                    status = %order.status,
                    accrual = ?order.accrual,
                    "order reconciled"
                );
                Ok(Disposition::Finished(order.status))
            }
            Err(StoreError::TerminalStatus { status, .. }) => {
                tracing::debug!(number = %order.number, %status, "order finished concurrently");
                Ok(Disposition::Skipped)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn clamp_cooldown(&self, number: OrderNumber, cooldown: Duration) -> Duration {
        let max = self.shared.max_cooldown;
        if cooldown <= max {
            return cooldown;
        }
        tracing::warn!(%number, requested = ?cooldown, ?max, "Retry-After too long, clamping");
        max
    }

    /// Puts the order back on the queue.
    ///
    /// A full queue defers the push to a background task while permits last;
    /// past that the worker itself waits for space or shutdown.
    async fn requeue(&self, item: WorkItem) -> Disposition {
        metrics::counter!("accrual_requeues_total").increment(1);

        let Err(item) = self.shared.queue.try_push(item) else {
            return Disposition::Requeued;
        };

        let queue = self.shared.queue.clone();
        let shutdown = self.shared.shutdown.clone();
        match Arc::clone(&self.shared.deferred).try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(number = %item.number, "work queue full, deferring re-enqueue");
                self.shared.tasks.spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = queue.push(item) => {}
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                let number = item.number;
                tracing::debug!(%number, "deferred re-enqueues exhausted, waiting for queue space");
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(%number, "shutdown while re-enqueueing, order stays pending");
                    }
                    result = queue.push(item) => {
                        if result.is_err() {
                            tracing::debug!(%number, "pool closed, order stays pending");
                        }
                    }
                }
            }
        }
        Disposition::Requeued
    }

    fn schedule_retry(&self, item: WorkItem, err: &AccrualError) -> Disposition {
        let next = item.after_failure();
        let Some(delay) = self.shared.retry.delay_for(next.failed_attempts) else {
            tracing::error!(
                number = %item.number,
                attempts = item.failed_attempts,
                error = %err,
                "accrual check failed, retry budget exhausted"
            );
            return Disposition::Dropped;
        };

        metrics::counter!("accrual_retries_scheduled_total").increment(1);
        tracing::warn!(
            number = %item.number,
            attempt = next.failed_attempts,
            ?delay,
            error = %err,
            "accrual check failed, retrying"
        );

        let queue = self.shared.queue.clone();
        let shutdown = self.shared.shutdown.clone();
        self.shared.tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = async {
                    tokio::time::sleep(delay).await;
                    if queue.push(next).await.is_err() {
                        tracing::warn!(number = %next.number, "pool closed, retry dropped");
                    }
                } => {}
            }
        });
        Disposition::RetryScheduled(delay)
    }
}
