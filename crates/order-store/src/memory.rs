use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Balance, NewOrder, NewWithdrawal, Order, OrderNumber, OrderStatus, Result, StoreError, UserId,
    Withdrawal, store::OrderStore,
};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderNumber, Order>,
    by_id: HashMap<i64, OrderNumber>,
    next_id: i64,
    updates: u64,
    withdrawals: Vec<Withdrawal>,
}

impl MemoryState {
    fn balance(&self, owner: UserId) -> Balance {
        let accrued: f64 = self
            .orders
            .values()
            .filter(|o| o.owner == owner && o.status == OrderStatus::Processed)
            .filter_map(|o| o.accrual)
            .sum();
        let withdrawn: f64 = self
            .withdrawals
            .iter()
            .filter(|w| w.owner == owner)
            .map(|w| w.sum)
            .sum();
        Balance::from_totals(accrued, withdrawn)
    }
}

/// In-memory order store implementation.
///
/// Provides the same semantics as the PostgreSQL implementation; every
/// operation holds the store lock for its whole duration, which serializes
/// writes to a row the way a single `UPDATE` statement does.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns how many updates were applied since creation.
    pub async fn update_count(&self) -> u64 {
        self.state.read().await.updates
    }

    /// Returns the total number of withdrawals recorded.
    pub async fn withdrawal_count(&self) -> usize {
        self.state.read().await.withdrawals.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.orders.get(&order.number) {
            return Err(StoreError::DuplicateOrder {
                number: order.number,
                owner: existing.owner,
            });
        }

        state.next_id += 1;
        let created = Order {
            id: state.next_id,
            number: order.number,
            owner: order.owner,
            status: OrderStatus::New,
            accrual: None,
            submitted_at: Utc::now(),
        };
        state.by_id.insert(created.id, created.number);
        state.orders.insert(created.number, created.clone());

        Ok(created)
    }

    async fn get_by_number(&self, number: OrderNumber) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&number).cloned())
    }

    async fn get_by_owner(&self, owner: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.submitted_at, o.id));
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        let number = state
            .by_id
            .get(&order.id)
            .copied()
            .ok_or(StoreError::OrderNotFound(order.number))?;
        let stored = state
            .orders
            .get_mut(&number)
            .ok_or(StoreError::OrderNotFound(number))?;

        if stored.status.is_terminal() {
            return Err(StoreError::TerminalStatus {
                number,
                status: stored.status,
            });
        }

        stored.status = order.status;
        stored.accrual = order.accrual;
        state.updates += 1;

        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<OrderNumber>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.status.is_pending())
            .collect();
        pending.sort_by_key(|o| (o.submitted_at, o.id));
        Ok(pending.into_iter().map(|o| o.number).collect())
    }

    async fn balance(&self, owner: UserId) -> Result<Balance> {
        Ok(self.state.read().await.balance(owner))
    }

    async fn withdraw(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal> {
        let mut state = self.state.write().await;

        if state.withdrawals.iter().any(|w| w.number == withdrawal.number) {
            return Err(StoreError::DuplicateWithdrawal(withdrawal.number));
        }
        let balance = state.balance(withdrawal.owner);
        if !balance.covers(withdrawal.sum) {
            return Err(StoreError::InsufficientFunds {
                requested: withdrawal.sum,
                available: balance.current,
            });
        }

        let recorded = Withdrawal {
            id: state.withdrawals.len() as i64 + 1,
            number: withdrawal.number,
            owner: withdrawal.owner,
            sum: withdrawal.sum,
            processed_at: Utc::now(),
        };
        state.withdrawals.push(recorded.clone());

        Ok(recorded)
    }

    async fn get_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        // Appended in processing order already.
        Ok(state
            .withdrawals
            .iter()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect())
    }
}
