//! Work queue and rate-limit signal shared by the pool's workers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use common::OrderNumber;
use tokio::sync::{Mutex, mpsc};

use crate::error::{AccrualError, Result};

/// An order number waiting for its next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub number: OrderNumber,
    /// Consecutive transient failures seen for this order. Only drives backoff.
    pub failed_attempts: u32,
}

impl WorkItem {
    pub fn new(number: OrderNumber) -> Self {
        Self {
            number,
            failed_attempts: 0,
        }
    }

    /// Returns the item to re-submit after one more transient failure.
    pub fn after_failure(self) -> Self {
        Self {
            number: self.number,
            failed_attempts: self.failed_attempts.saturating_add(1),
        }
    }
}

/// Multi-producer channel whose receiver is shared by several consumers.
struct SharedChannel<T> {
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> SharedChannel<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl<T> Clone for SharedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Bounded FIFO of orders awaiting a poll.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct WorkQueue {
    channel: SharedChannel<WorkItem>,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            channel: SharedChannel::new(capacity.max(1)),
        }
    }

    /// Enqueues an item, waiting for free capacity.
    pub async fn push(&self, item: WorkItem) -> Result<()> {
        self.channel
            .tx
            .send(item)
            .await
            .map_err(|_| AccrualError::PoolClosed)
    }

    /// Enqueues an item without waiting. Hands the item back when the queue is full.
    pub fn try_push(&self, item: WorkItem) -> std::result::Result<(), WorkItem> {
        self.channel.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) | mpsc::error::TrySendError::Closed(item) => item,
        })
    }

    /// Waits for the next item.
    pub async fn pop(&self) -> Option<WorkItem> {
        self.channel.recv().await
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.channel.tx.max_capacity()
    }

    /// Removes and returns everything currently queued.
    ///
    /// The pool calls this on shutdown to account for abandoned items.
    pub async fn drain(&self) -> Vec<WorkItem> {
        let mut rx = self.channel.rx.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Shared channel carrying cooldown durations requested by the accrual service.
///
/// Each raised cooldown is consumed by exactly one worker.
#[derive(Clone)]
pub struct RateLimitSignal {
    channel: SharedChannel<Duration>,
}

impl RateLimitSignal {
    pub fn new(capacity: usize) -> Self {
        Self {
            channel: SharedChannel::new(capacity.max(1)),
        }
    }

    /// Publishes a cooldown. Returns false if the signal is saturated and the
    /// cooldown was dropped.
    pub fn raise(&self, cooldown: Duration) -> bool {
        self.channel.tx.try_send(cooldown).is_ok()
    }

    /// Waits for the next cooldown.
    pub async fn recv(&self) -> Option<Duration> {
        self.channel.recv().await
    }

    /// Number of cooldowns not yet picked up by a worker.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RateLimitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitSignal")
            .field("pending", &self.len())
            .finish()
    }
}
