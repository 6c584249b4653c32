use async_trait::async_trait;

use crate::{
    Balance, NewOrder, NewWithdrawal, Order, OrderNumber, Result, StoreError, UserId, Withdrawal,
};

/// Core trait for order and withdrawal record stores.
///
/// Implementations must serialize concurrent writes to the same order row;
/// writes to different orders need no coordination. Withdrawals of one user
/// are serialized against each other so the balance check cannot be raced.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates an order in `NEW` status.
    ///
    /// Fails with `DuplicateOrder` (carrying the existing owner) if the
    /// number is already registered.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Fetches an order by its number.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_by_number(&self, number: OrderNumber) -> Result<Option<Order>>;

    /// Fetches all orders of a user, oldest submission first.
    async fn get_by_owner(&self, owner: UserId) -> Result<Vec<Order>>;

    /// Persists the status and accrual of an existing order, matched by id.
    ///
    /// Must affect exactly one row: fails with `OrderNotFound` when no row
    /// matches and with `TerminalStatus` when the stored order is already
    /// terminal, leaving it untouched.
    async fn update(&self, order: &Order) -> Result<()>;

    /// Returns the numbers of all orders that are not yet terminal,
    /// oldest submission first.
    async fn list_pending(&self) -> Result<Vec<OrderNumber>>;

    /// Computes the user's balance from processed accruals and withdrawals.
    async fn balance(&self, owner: UserId) -> Result<Balance>;

    /// Records a withdrawal if the current balance covers it.
    ///
    /// Fails with `InsufficientFunds` when it does not and with
    /// `DuplicateWithdrawal` when the number was already used.
    async fn withdraw(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal>;

    /// Fetches all withdrawals of a user, oldest first.
    async fn get_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Fetches an order, treating absence as an error.
    async fn require_order(&self, number: OrderNumber) -> Result<Order> {
        self.get_by_number(number)
            .await?
            .ok_or(StoreError::OrderNotFound(number))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
