use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};

use crate::{
    Balance, NewOrder, NewWithdrawal, Order, OrderNumber, OrderStatus, Result, StoreError, UserId,
    Withdrawal, store::OrderStore,
};

const ORDER_COLUMNS: &str = "id, number, user_id, status, accrual, uploaded_at";
const WITHDRAWAL_COLUMNS: &str = "id, number, user_id, sum, processed_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let number: i64 = row.try_get("number")?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: row.try_get("id")?,
            number: OrderNumber::try_from(number)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
            owner: UserId::new(row.try_get("user_id")?),
            status: status.parse()?,
            accrual: row.try_get("accrual")?,
            submitted_at: row.try_get("uploaded_at")?,
        })
    }

    fn row_to_withdrawal(row: PgRow) -> Result<Withdrawal> {
        let number: i64 = row.try_get("number")?;

        Ok(Withdrawal {
            id: row.try_get("id")?,
            number: OrderNumber::try_from(number)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
            owner: UserId::new(row.try_get("user_id")?),
            sum: row.try_get("sum")?,
            processed_at: row.try_get("processed_at")?,
        })
    }

    async fn fetch_balance<'e>(executor: impl PgExecutor<'e>, owner: UserId) -> Result<Balance> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE((SELECT SUM(accrual) FROM orders
                          WHERE user_id = $1 AND status = 'PROCESSED'), 0)::DOUBLE PRECISION AS accrued,
                COALESCE((SELECT SUM(sum) FROM withdrawals
                          WHERE user_id = $1), 0)::DOUBLE PRECISION AS withdrawn
            "#,
        )
        .bind(owner.as_i64())
        .fetch_one(executor)
        .await?;

        Ok(Balance::from_totals(
            row.try_get("accrued")?,
            row.try_get("withdrawn")?,
        ))
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (number, user_id, status) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.number.as_i64())
        .bind(order.owner.as_i64())
        .bind(OrderStatus::New.as_str())
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => Self::row_to_order(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("unique_order_number") =>
            {
                // The number is taken; report who owns it.
                let owner: i64 = sqlx::query_scalar("SELECT user_id FROM orders WHERE number = $1")
                    .bind(order.number.as_i64())
                    .fetch_one(&self.pool)
                    .await?;
                Err(StoreError::DuplicateOrder {
                    number: order.number,
                    owner: UserId::new(owner),
                })
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_by_number(&self, number: OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"
        ))
        .bind(number.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_by_owner(&self, owner: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY uploaded_at ASC, id ASC"
        ))
        .bind(owner.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self, order), fields(number = %order.number, status = %order.status))]
    async fn update(&self, order: &Order) -> Result<()> {
        // A single conditional statement: the row lock serializes concurrent
        // writers and terminal rows are never matched.
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $1, accrual = $2
            WHERE id = $3 AND status NOT IN ('INVALID', 'PROCESSED')
            "#,
        )
        .bind(order.status.as_str())
        .bind(order.accrual)
        .bind(order.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let stored: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order.id)
            .fetch_optional(&self.pool)
            .await?;

        match stored {
            None => Err(StoreError::OrderNotFound(order.number)),
            Some(status) => Err(StoreError::TerminalStatus {
                number: order.number,
                status: status.parse()?,
            }),
        }
    }

    async fn list_pending(&self) -> Result<Vec<OrderNumber>> {
        let numbers: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT number FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        numbers
            .into_iter()
            .map(|n| OrderNumber::try_from(n).map_err(|e| StoreError::InvalidRecord(e.to_string())))
            .collect()
    }

    async fn balance(&self, owner: UserId) -> Result<Balance> {
        Self::fetch_balance(&self.pool, owner).await
    }

    #[tracing::instrument(skip(self, withdrawal), fields(number = %withdrawal.number, owner = %withdrawal.owner))]
    async fn withdraw(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal> {
        let mut tx = self.pool.begin().await?;

        // Serializes withdrawals of one user until commit.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(withdrawal.owner.as_i64())
            .execute(&mut *tx)
            .await?;

        let balance = Self::fetch_balance(&mut *tx, withdrawal.owner).await?;
        if !balance.covers(withdrawal.sum) {
            return Err(StoreError::InsufficientFunds {
                requested: withdrawal.sum,
                available: balance.current,
            });
        }

        let row = sqlx::query(&format!(
            "INSERT INTO withdrawals (number, user_id, sum) VALUES ($1, $2, $3) RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(withdrawal.number.as_i64())
        .bind(withdrawal.owner.as_i64())
        .bind(withdrawal.sum)
        .fetch_one(&mut *tx)
        .await;

        let recorded = match row {
            Ok(row) => Self::row_to_withdrawal(row)?,
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("unique_withdrawal_number") =>
            {
                return Err(StoreError::DuplicateWithdrawal(withdrawal.number));
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        tx.commit().await?;
        Ok(recorded)
    }

    async fn get_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = $1 ORDER BY processed_at ASC, id ASC"
        ))
        .bind(owner.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_withdrawal).collect()
    }
}
