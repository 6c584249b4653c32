//! Accrual reconciliation worker.
//!
//! A bounded pool of pollers drives every submitted order through its status
//! lifecycle by querying the external accrual service:
//! 1. Pull an order number from the work queue
//! 2. Query the accrual service
//! 3. Persist the resulting status transition
//! 4. Re-enqueue the order while it is pending or throttled
//!
//! Throttling responses are propagated to the pool as cooldowns on a shared
//! rate-limit signal; transient failures are retried with exponential backoff.

pub mod client;
pub mod error;
pub mod http;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod stub;
pub mod worker;

pub use client::{AccrualClient, AccrualResponse, Outcome, RemoteStatus};
pub use error::{AccrualError, Result};
pub use http::HttpAccrualClient;
pub use pool::{PoolConfig, Submitter, WorkerPool};
pub use queue::{RateLimitSignal, WorkItem, WorkQueue};
pub use retry::RetryPolicy;
pub use stub::{InMemoryAccrualClient, StubReply};
pub use worker::{Disposition, Step, Worker};
