pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod store;
pub mod withdrawal;

pub use common::{OrderNumber, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use order::{NewOrder, Order, OrderStatus};
pub use postgres::PostgresOrderStore;
pub use store::{OrderStore, OrderStoreExt};
pub use withdrawal::{Balance, NewWithdrawal, Withdrawal};
