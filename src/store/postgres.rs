use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus, UserId};

use super::{OrderStore, StoreError};

type OrderRow = (i64, DateTime<Utc>, String, i64, i64, Option<String>);

const SELECT_COLUMNS: &str = "SELECT id, created_at, status, created_by_id, customer_id, description FROM orders";

/// PostgreSQL-backed order store
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        tracing::info!("Connected to PostgreSQL order store");
        Ok(Self { pool })
    }

    /// Create the orders table if it does not exist yet
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id            BIGSERIAL PRIMARY KEY,
                created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
                status        TEXT NOT NULL,
                created_by_id BIGINT NOT NULL,
                customer_id   BIGINT NOT NULL,
                description   TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS orders_owner_created_idx
             ON orders (created_by_id, created_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode(row: OrderRow) -> Result<Order, StoreError> {
        let (id, created_at, status, created_by_id, customer_id, description) = row;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;

        Ok(Order {
            id,
            created_at,
            status,
            created_by_id,
            customer_id,
            description,
        })
    }

    fn decode_all(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        rows.into_iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let row: OrderRow = sqlx::query_as(
            "INSERT INTO orders (status, created_by_id, customer_id, description)
             VALUES ($1, $2, $3, $4)
             RETURNING id, created_at, status, created_by_id, customer_id, description",
        )
        .bind(order.status.as_str())
        .bind(order.created_by_id)
        .bind(order.customer_id)
        .bind(&order.description)
        .fetch_one(&self.pool)
        .await?;

        Self::decode(row)
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "UPDATE orders SET status = $1 WHERE id = $2
             RETURNING id, created_at, status, created_by_id, customer_id, description",
        )
        .bind(order.status.as_str())
        .bind(order.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::decode(row),
            None => Err(StoreError::Missing(order.id)),
        }
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::decode).transpose()
    }

    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE created_by_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(rows)
    }

    async fn find_by_owner_and_status_in(
        &self,
        owner: UserId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE created_by_id = $1 AND status = ANY($2)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(rows)
    }
}
