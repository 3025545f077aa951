use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus, UserId};

use super::{OrderStore, StoreError};

struct Inner {
    next_id: OrderId,
    last_created_at: Option<DateTime<Utc>>,
    orders: BTreeMap<OrderId, Order>,
}

/// Process-local order store
///
/// Ids are assigned sequentially and creation timestamps never go backwards,
/// so timestamp order always agrees with id order.
pub struct InMemoryOrderStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                last_created_at: None,
                orders: BTreeMap::new(),
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent insert/save fail (simulates an unavailable database)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a fully formed order as-is (fixtures and imports)
    pub async fn put(&self, order: Order) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(order.id + 1);
        inner.orders.insert(order.id, order);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        self.check_writable()?;

        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let now = Utc::now();
        let created_at = match inner.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.last_created_at = Some(created_at);

        let order = order.into_order(id, created_at);
        inner.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        self.check_writable()?;

        let mut inner = self.inner.write().await;
        let stored = inner
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::Missing(order.id))?;

        stored.status = order.status;
        Ok(stored.clone())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let orders = inner
            .orders
            .values()
            .filter(|o| o.created_by_id == owner)
            .cloned()
            .collect();
        Ok(Self::newest_first(orders))
    }

    async fn find_by_owner_and_status_in(
        &self,
        owner: UserId,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let orders = inner
            .orders
            .values()
            .filter(|o| o.created_by_id == owner && statuses.contains(&o.status))
            .cloned()
            .collect();
        Ok(Self::newest_first(orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids_and_timestamps() {
        let store = InMemoryOrderStore::new();

        let first = store.insert(NewOrder::pending(1, 100, "a".into())).await.unwrap();
        let second = store.insert(NewOrder::pending(1, 100, "b".into())).await.unwrap();

        assert!(second.id > first.id);
        assert!(second.created_at >= first.created_at);
        assert_eq!(store.find_by_id(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_owner_queries_are_newest_first_and_scoped() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(NewOrder::pending(1, 100, "a".into())).await.unwrap();
        let _other = store.insert(NewOrder::pending(2, 100, "x".into())).await.unwrap();
        let b = store.insert(NewOrder::pending(1, 100, "b".into())).await.unwrap();

        let ids: Vec<_> = store.find_by_owner(1).await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_status_filter() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(NewOrder::pending(1, 100, "a".into())).await.unwrap();
        let mut b = store.insert(NewOrder::pending(1, 100, "b".into())).await.unwrap();
        b.transition_to(OrderStatus::Cancelled);
        store.save(&b).await.unwrap();

        let active = store
            .find_by_owner_and_status_in(1, &OrderStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }

    #[tokio::test]
    async fn test_save_unknown_order_fails() {
        let store = InMemoryOrderStore::new();
        let ghost = NewOrder::pending(1, 100, "a".into()).into_order(99, Utc::now());
        assert!(matches!(store.save(&ghost).await, Err(StoreError::Missing(99))));
    }

    #[tokio::test]
    async fn test_failed_writes() {
        let store = InMemoryOrderStore::new();
        store.set_fail_writes(true);
        assert!(store.insert(NewOrder::pending(1, 100, "a".into())).await.is_err());
        assert!(store.find_by_owner(1).await.unwrap().is_empty());
    }
}
