//! Scripted in-memory accrual service for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderNumber;

use crate::client::{AccrualClient, AccrualResponse, Outcome, RemoteStatus};
use crate::error::{AccrualError, Result};

/// One scripted answer of the in-memory accrual service.
#[derive(Debug, Clone, PartialEq)]
pub enum StubReply {
    Processed(f64),
    Processing,
    Registered,
    RemoteInvalid,
    NotFound,
    Throttled(Option<Duration>),
    /// Non-contract HTTP status, surfaced as a transient error.
    Failure(u16),
}

impl StubReply {
    fn into_result(self, number: OrderNumber) -> Result<Outcome> {
        let ready = |status: RemoteStatus, accrual: Option<f64>| -> Result<Outcome> {
            Ok(Outcome::Ready(AccrualResponse {
                order: number.to_string(),
                status,
                accrual,
            }))
        };

        match self {
            StubReply::Processed(amount) => ready(RemoteStatus::Processed, Some(amount)),
            StubReply::Processing => ready(RemoteStatus::Processing, None),
            StubReply::Registered => ready(RemoteStatus::Registered, None),
            StubReply::RemoteInvalid => ready(RemoteStatus::Invalid, None),
            StubReply::NotFound => Ok(Outcome::NotFound),
            StubReply::Throttled(retry_after) => Ok(Outcome::Throttled { retry_after }),
            StubReply::Failure(status) => Err(AccrualError::UnexpectedStatus(status)),
        }
    }
}

#[derive(Debug)]
struct StubState {
    scripts: HashMap<OrderNumber, Vec<StubReply>>,
    default_reply: StubReply,
    queries: HashMap<OrderNumber, usize>,
}

/// In-memory accrual client.
///
/// Replies scripted for an order are consumed in order; the last one repeats
/// forever. Orders without a script get the default reply (`NotFound`).
#[derive(Debug, Clone)]
pub struct InMemoryAccrualClient {
    state: Arc<Mutex<StubState>>,
}

impl Default for InMemoryAccrualClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccrualClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState {
                scripts: HashMap::new(),
                default_reply: StubReply::NotFound,
                queries: HashMap::new(),
            })),
        }
    }

    /// Scripts the replies for one order.
    pub fn script(&self, number: OrderNumber, replies: Vec<StubReply>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.scripts.insert(number, replies);
    }

    /// Sets the reply for orders without a script.
    pub fn set_default(&self, reply: StubReply) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.default_reply = reply;
    }

    /// Number of queries made for one order.
    pub fn query_count(&self, number: OrderNumber) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queries.get(&number).copied().unwrap_or(0)
    }

    /// Number of queries made in total.
    pub fn total_queries(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queries.values().sum()
    }
}

#[async_trait]
impl AccrualClient for InMemoryAccrualClient {
    async fn query(&self, number: OrderNumber) -> Result<Outcome> {
        let reply = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state.queries.entry(number).or_insert(0) += 1;

            let default_reply = state.default_reply.clone();
            match state.scripts.get_mut(&number) {
                Some(script) if script.len() > 1 => script.remove(0),
                Some(script) => script.first().cloned().unwrap_or(default_reply),
                None => default_reply,
            }
        };

        reply.into_result(number)
    }
}
