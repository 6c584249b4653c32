//! Order service providing submission, listing, balance and withdrawal operations.

use accrual::Submitter;
use common::{OrderNumber, UserId};
use order_store::{
    Balance, NewOrder, NewWithdrawal, Order, OrderStore, OrderStoreExt, StoreError, Withdrawal,
};

use crate::error::{OrderServiceError, Result};

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The order was recorded and handed to the accrual pool.
    Accepted(Order),
    /// The caller had already submitted this number.
    AlreadySubmitted(Order),
}

impl SubmitOutcome {
    pub fn order(&self) -> &Order {
        match self {
            SubmitOutcome::Accepted(order) | SubmitOutcome::AlreadySubmitted(order) => order,
        }
    }
}

/// Service for a user's orders and the cashback withdrawn from them.
pub struct OrderService<S: OrderStore> {
    store: S,
    submitter: Submitter,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service handing accepted orders to `submitter`.
    pub fn new(store: S, submitter: Submitter) -> Self {
        Self { store, submitter }
    }

    /// Number of orders waiting for an accrual worker.
    pub fn queued(&self) -> usize {
        self.submitter.queued()
    }

    /// Validates and records an order number for `owner`.
    ///
    /// Duplicates are detected by the store, so concurrent submissions of the
    /// same number resolve to exactly one `Accepted`.
    #[tracing::instrument(skip(self))]
    pub async fn submit_order(&self, owner: UserId, raw: &str) -> Result<SubmitOutcome> {
        let number: OrderNumber = raw.trim().parse()?;

        let order = match self.store.create(NewOrder::new(number, owner)).await {
            Ok(order) => order,
            Err(StoreError::DuplicateOrder { owner: existing, .. }) if existing == owner => {
                let order = self.store.require_order(number).await?;
                return Ok(SubmitOutcome::AlreadySubmitted(order));
            }
            Err(StoreError::DuplicateOrder { .. }) => {
                return Err(OrderServiceError::OwnedByAnotherUser(number));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("orders_submitted_total").increment(1);
        tracing::info!(%number, %owner, "order accepted");

        // The record is durable; a failed hand-off is picked up by startup recovery.
        if let Err(e) = self.submitter.submit(number).await {
            tracing::warn!(%number, error = %e, "order not queued for accrual");
        }

        Ok(SubmitOutcome::Accepted(order))
    }

    /// Lists the orders of `owner`, oldest submission first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>> {
        Ok(self.store.get_by_owner(owner).await?)
    }

    /// Current balance and total withdrawn for `owner`.
    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, owner: UserId) -> Result<Balance> {
        Ok(self.store.balance(owner).await?)
    }

    /// Withdraws `sum` from the balance of `owner` against an order number.
    ///
    /// The number must pass the Luhn check and may be used for one
    /// withdrawal only.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw(&self, owner: UserId, raw: &str, sum: f64) -> Result<Withdrawal> {
        if !sum.is_finite() || sum <= 0.0 {
            return Err(OrderServiceError::InvalidSum(sum));
        }
        let number: OrderNumber = raw
            .trim()
            .parse()
            .map_err(OrderServiceError::InvalidWithdrawalNumber)?;

        let withdrawal = match self.store.withdraw(NewWithdrawal::new(number, owner, sum)).await {
            Ok(withdrawal) => withdrawal,
            Err(StoreError::InsufficientFunds {
                requested,
                available,
            }) => {
                tracing::info!(%number, %owner, requested, available, "withdrawal refused");
                return Err(OrderServiceError::InsufficientFunds {
                    requested,
                    available,
                });
            }
            Err(StoreError::DuplicateWithdrawal(number)) => {
                return Err(OrderServiceError::WithdrawalExists(number));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("withdrawals_total").increment(1);
        tracing::info!(%number, %owner, sum, "withdrawal recorded");
        Ok(withdrawal)
    }

    /// Lists the withdrawals of `owner`, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>> {
        Ok(self.store.get_withdrawals(owner).await?)
    }
}
