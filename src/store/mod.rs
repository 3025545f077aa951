// ============================================================================
// Order Store - persistence of order records
// ============================================================================
//
// Two backends share one trait:
// - InMemoryOrderStore: process-local, used when no database is configured
// - PgOrderStore: PostgreSQL through sqlx
//
// Owner queries return newest first (created_at DESC, id DESC).
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus, UserId};

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order {0} does not exist")]
    Missing(OrderId),

    #[error("Corrupt order row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order, assigning its id and creation timestamp
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError>;

    /// Persist the mutable fields of an existing order
    async fn save(&self, order: &Order) -> Result<Order, StoreError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError>;

    async fn find_by_owner_and_status_in(
        &self,
        owner: UserId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, StoreError>;
}
