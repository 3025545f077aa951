use std::sync::Arc;

use crate::messaging::OrderEventPublisher;
use crate::metrics::Metrics;
use crate::store::OrderStore;

use super::aggregate::{NewOrder, Order};
use super::commands::CreateOrder;
use super::errors::OrderError;
use super::events::{DomainEvent, OrderCreatedEvent, OrderStatusChangedEvent};
use super::value_objects::{OrderId, OrderStatus, UserId};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Validation → Store → Event Bus
//
// The store write and the publish are not atomic. An order that committed is
// returned to the caller even if its event could not be published; the loss
// is logged and counted under events_publish_failed_total.
//
// ============================================================================

#[derive(Clone)]
pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
    publisher: OrderEventPublisher,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn OrderStore>, publisher: OrderEventPublisher, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            publisher,
            metrics,
        }
    }

    /// Create a pending order owned by `owner` and announce it
    pub async fn create(&self, owner: UserId, command: CreateOrder) -> Result<Order, OrderError> {
        let input = command.validate()?;

        let order = self
            .store
            .insert(NewOrder::pending(owner, input.customer_id, input.description))
            .await?;

        self.metrics.orders_created.inc();
        tracing::info!(
            order_id = order.id,
            user_id = owner,
            customer_id = order.customer_id,
            "Order created"
        );

        self.announce(&OrderCreatedEvent::from(&order)).await;
        Ok(order)
    }

    /// Move an order to `new_status` and announce the change
    ///
    /// Any status may follow any other, including itself.
    pub async fn update_status(&self, id: OrderId, new_status: OrderStatus) -> Result<Order, OrderError> {
        let mut order = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(OrderError::NotFound(id))?;

        let transition = order.transition_to(new_status);
        let order = self.store.save(&order).await?;

        self.metrics
            .order_status_changes
            .with_label_values(&[new_status.as_str()])
            .inc();
        tracing::info!(
            order_id = order.id,
            old_status = %transition.old,
            new_status = %transition.new,
            "Order status updated"
        );

        self.announce(&OrderStatusChangedEvent::from_transition(&order, transition))
            .await;
        Ok(order)
    }

    /// Orders owned by `owner`, newest first; `active_only` keeps unfinished ones
    pub async fn list(&self, owner: UserId, active_only: bool) -> Result<Vec<Order>, OrderError> {
        let orders = if active_only {
            self.store
                .find_by_owner_and_status_in(owner, &OrderStatus::ACTIVE)
                .await?
        } else {
            self.store.find_by_owner(owner).await?
        };
        Ok(orders)
    }

    async fn announce<E: DomainEvent + Sync>(&self, event: &E) {
        if let Err(e) = self.publisher.publish(event).await {
            tracing::error!(
                order_id = event.order_id(),
                topic = event.topic(),
                error = %e,
                "Order committed but its event was not published"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ORDER_CREATED_TOPIC, ORDER_STATUS_CHANGED_TOPIC};
    use crate::messaging::InMemoryEventBus;
    use crate::store::InMemoryOrderStore;
    use crate::utils::RetryConfig;

    struct Fixture {
        handler: OrderCommandHandler,
        store: Arc<InMemoryOrderStore>,
        bus: InMemoryEventBus,
    }

    fn fixture() -> Fixture {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = Arc::new(InMemoryOrderStore::new());
        let bus = InMemoryEventBus::new();
        let publisher = OrderEventPublisher::new(Arc::new(bus.clone()), metrics.clone())
            .with_retry(RetryConfig::none());
        let handler = OrderCommandHandler::new(store.clone(), publisher, metrics);
        Fixture { handler, store, bus }
    }

    fn created_events(bus: &InMemoryEventBus) -> Vec<OrderCreatedEvent> {
        bus.published(ORDER_CREATED_TOPIC)
            .iter()
            .map(|m| serde_json::from_slice(m.payload.as_deref().unwrap()).unwrap())
            .collect()
    }

    fn changed_events(bus: &InMemoryEventBus) -> Vec<OrderStatusChangedEvent> {
        bus.published(ORDER_STATUS_CHANGED_TOPIC)
            .iter()
            .map(|m| serde_json::from_slice(m.payload.as_deref().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_create_persists_pending_order_and_publishes_once() {
        let f = fixture();
        let started = chrono::Utc::now();

        let order = f.handler.create(7, CreateOrder::new(3, "Two boxes")).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.created_at >= started);
        assert_eq!(order.created_by_id, 7);
        assert_eq!(f.store.find_by_id(order.id).await.unwrap(), Some(order.clone()));

        let events = created_events(&f.bus);
        assert_eq!(events, vec![OrderCreatedEvent::from(&order)]);
        assert_eq!(events[0].customer_id, 3);
        assert_eq!(events[0].description.as_deref(), Some("Two boxes"));
    }

    #[tokio::test]
    async fn test_invalid_create_touches_nothing() {
        let f = fixture();

        let result = f.handler.create(7, CreateOrder { customer_id: Some(3), description: None }).await;

        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert!(f.handler.list(7, false).await.unwrap().is_empty());
        assert!(f.bus.published(ORDER_CREATED_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_publishes_nothing() {
        let f = fixture();
        f.store.set_fail_writes(true);

        let result = f.handler.create(7, CreateOrder::new(3, "x")).await;

        assert!(matches!(result, Err(OrderError::Store(_))));
        assert!(f.bus.published(ORDER_CREATED_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_still_returns_the_order() {
        let f = fixture();
        f.bus.set_fail_publishes(true);

        let order = f.handler.create(7, CreateOrder::new(3, "x")).await.unwrap();

        assert_eq!(f.store.find_by_id(order.id).await.unwrap(), Some(order));
        assert!(f.bus.published(ORDER_CREATED_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_update_publishes_old_and_new_status() {
        let f = fixture();
        let order = f.handler.create(7, CreateOrder::new(3, "x")).await.unwrap();

        let updated = f.handler.update_status(order.id, OrderStatus::Shipped).await.unwrap();

        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(updated.created_at, order.created_at);
        assert_eq!(
            changed_events(&f.bus),
            vec![OrderStatusChangedEvent {
                order_id: order.id,
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Shipped,
                created_by_id: Some(7),
            }]
        );
    }

    #[tokio::test]
    async fn test_processing_to_cancelled() {
        let f = fixture();
        let order = f.handler.create(7, CreateOrder::new(3, "x")).await.unwrap();
        f.handler.update_status(order.id, OrderStatus::Processing).await.unwrap();

        f.handler.update_status(order.id, OrderStatus::Cancelled).await.unwrap();

        let last = changed_events(&f.bus).pop().unwrap();
        assert_eq!(last.old_status, OrderStatus::Processing);
        assert_eq!(last.new_status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_same_status_update_still_publishes() {
        let f = fixture();
        let order = f.handler.create(7, CreateOrder::new(3, "x")).await.unwrap();

        f.handler.update_status(order.id, OrderStatus::Pending).await.unwrap();

        let events = changed_events(&f.bus);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_status, events[0].new_status);
    }

    #[tokio::test]
    async fn test_update_unknown_order_publishes_nothing() {
        let f = fixture();

        let result = f.handler.update_status(404, OrderStatus::Shipped).await;

        assert!(matches!(result, Err(OrderError::NotFound(404))));
        assert!(f.bus.published(ORDER_STATUS_CHANGED_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_active_list_is_an_ordered_subset() {
        let f = fixture();
        let a = f.handler.create(7, CreateOrder::new(1, "a")).await.unwrap();
        let b = f.handler.create(7, CreateOrder::new(1, "b")).await.unwrap();
        let c = f.handler.create(7, CreateOrder::new(1, "c")).await.unwrap();
        f.handler.create(8, CreateOrder::new(1, "other")).await.unwrap();
        f.handler.update_status(b.id, OrderStatus::Delivered).await.unwrap();

        let all: Vec<OrderId> = f.handler.list(7, false).await.unwrap().iter().map(|o| o.id).collect();
        let active: Vec<OrderId> = f.handler.list(7, true).await.unwrap().iter().map(|o| o.id).collect();

        assert_eq!(all, vec![c.id, b.id, a.id]);
        assert_eq!(active, vec![c.id, a.id]);
    }
}
