use std::sync::Arc;
use std::time::Duration;

use crate::domain::order::{
    OrderCreatedEvent, OrderEvent, OrderStatusChangedEvent, UserId, ORDER_CREATED_TOPIC,
    ORDER_STATUS_CHANGED_TOPIC,
};
use crate::messaging::{BusMessage, EventSource};
use crate::metrics::Metrics;

use super::registry::{DispatchOutcome, SubscriberRegistry};

/// Topics the notification side listens to
pub const CONSUMED_TOPICS: [&str; 2] = [ORDER_CREATED_TOPIC, ORDER_STATUS_CHANGED_TOPIC];

pub const ORDER_CREATED_FRAME: &str = "order-created";
pub const ORDER_STATUS_CHANGED_FRAME: &str = "order-status-changed";

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("No handler for topic {0}")]
    UnknownTopic(String),

    #[error("Message has no payload")]
    MissingPayload,

    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Turn a raw bus message into a typed order event, routed by topic
pub fn decode(message: &BusMessage) -> Result<OrderEvent, DecodeError> {
    let payload = message.payload.as_deref().ok_or(DecodeError::MissingPayload)?;

    match message.topic.as_str() {
        ORDER_CREATED_TOPIC => Ok(OrderEvent::Created(serde_json::from_slice::<OrderCreatedEvent>(
            payload,
        )?)),
        ORDER_STATUS_CHANGED_TOPIC => Ok(OrderEvent::StatusChanged(serde_json::from_slice::<
            OrderStatusChangedEvent,
        >(payload)?)),
        other => Err(DecodeError::UnknownTopic(other.to_string())),
    }
}

/// What happened to one consumed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Dispatched(DispatchOutcome),
    /// Consumed without a push (status changes by default)
    Logged,
    /// Undecodable or undeliverable; acknowledged and skipped
    Skipped,
}

// ============================================================================
// Notification Consumer - bus events to push frames
// ============================================================================
//
// - order-created:        pushed to the creator as an `order-created` frame
// - order-status-changed: logged; pushed as `order-status-changed` only when
//                         enabled and the event names its owner
//
// Every message is acknowledged once handled, poison messages included, so a
// bad payload never blocks the partition.
//
// ============================================================================

#[derive(Clone)]
pub struct NotificationConsumer {
    registry: SubscriberRegistry,
    metrics: Arc<Metrics>,
    dispatch_status_changes: bool,
}

impl NotificationConsumer {
    pub fn new(registry: SubscriberRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            metrics,
            dispatch_status_changes: false,
        }
    }

    pub fn with_status_changes(mut self, enabled: bool) -> Self {
        self.dispatch_status_changes = enabled;
        self
    }

    pub async fn handle(&self, message: &BusMessage) -> HandleOutcome {
        let event = match decode(message) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Skipping undecodable message"
                );
                self.metrics.record_consumed(&message.topic, true);
                return HandleOutcome::Skipped;
            }
        };
        self.metrics.record_consumed(&message.topic, false);

        match event {
            OrderEvent::Created(event) => {
                tracing::info!(
                    order_id = event.order_id,
                    user_id = event.created_by_id,
                    "Order created, notifying creator"
                );
                self.push(event.created_by_id, ORDER_CREATED_FRAME, &event).await
            }
            OrderEvent::StatusChanged(event) => {
                tracing::info!(
                    order_id = event.order_id,
                    old_status = %event.old_status,
                    new_status = %event.new_status,
                    "Order status changed"
                );
                match event.created_by_id {
                    Some(user_id) if self.dispatch_status_changes => {
                        self.push(user_id, ORDER_STATUS_CHANGED_FRAME, &event).await
                    }
                    _ => HandleOutcome::Logged,
                }
            }
        }
    }

    async fn push<T>(&self, user_id: UserId, frame: &str, event: &T) -> HandleOutcome
    where
        T: serde::Serialize + Sync,
    {
        match self.registry.dispatch(user_id, frame, event).await {
            Ok(outcome) => HandleOutcome::Dispatched(outcome),
            Err(e) => {
                tracing::error!(user_id = user_id, error = %e, "Failed to dispatch notification");
                HandleOutcome::Skipped
            }
        }
    }

    /// Consume until the source closes
    pub async fn run<S>(&self, source: &mut S)
    where
        S: EventSource + ?Sized,
    {
        tracing::info!(topics = ?CONSUMED_TOPICS, "Notification consumer started");

        while let Some(next) = source.next_message().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive from event bus");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    continue;
                }
            };

            self.handle(&message).await;

            if let Err(e) = source.acknowledge(&message).await {
                tracing::warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "Failed to acknowledge message"
                );
            }
        }

        tracing::info!("Notification consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CreateOrder, OrderCommandHandler, OrderStatus};
    use crate::messaging::{InMemoryEventBus, OrderEventPublisher};
    use crate::notifications::ConnectionSettings;
    use crate::store::InMemoryOrderStore;
    use futures_util::StreamExt;

    fn setup(status_changes: bool) -> (SubscriberRegistry, NotificationConsumer, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = SubscriberRegistry::new(
            ConnectionSettings {
                keepalive: Duration::from_secs(60),
                ..ConnectionSettings::default()
            },
            metrics.clone(),
        );
        let consumer = NotificationConsumer::new(registry.clone(), metrics.clone())
            .with_status_changes(status_changes);
        (registry, consumer, metrics)
    }

    fn message(topic: &str, payload: &str) -> BusMessage {
        BusMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: 0,
            key: Some("1".to_string()),
            payload: Some(payload.as_bytes().to_vec()),
        }
    }

    async fn next_text(body: &mut crate::notifications::PushBody) -> String {
        String::from_utf8(body.next().await.unwrap().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_decode_routes_by_topic() {
        let created = message(
            "order-created",
            r#"{"orderId":1,"createdAt":"2024-05-01T10:00:00Z","status":"PENDING","createdById":7,"customerId":3,"description":"x","extra":true}"#,
        );
        assert!(matches!(decode(&created), Ok(OrderEvent::Created(e)) if e.created_by_id == 7));

        let changed = message(
            "order-status-changed",
            r#"{"orderId":1,"oldStatus":"PENDING","newStatus":"SHIPPED"}"#,
        );
        assert!(matches!(
            decode(&changed),
            Ok(OrderEvent::StatusChanged(e)) if e.new_status == OrderStatus::Shipped && e.created_by_id.is_none()
        ));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode(&message("order-created", "{nope")), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(&message("payments", "{}")), Err(DecodeError::UnknownTopic(_))));

        let mut empty = message("order-created", "");
        empty.payload = None;
        assert!(matches!(decode(&empty), Err(DecodeError::MissingPayload)));
    }

    #[tokio::test]
    async fn test_poison_message_is_counted_and_skipped() {
        let (_, consumer, metrics) = setup(false);

        let outcome = consumer.handle(&message("order-created", "not json")).await;

        assert_eq!(outcome, HandleOutcome::Skipped);
        assert_eq!(metrics.events_poison.with_label_values(&["order-created"]).get(), 1);
    }

    #[tokio::test]
    async fn test_status_change_is_logged_by_default() {
        let (registry, consumer, _) = setup(false);
        let _stream = registry.subscribe(7).await;

        let outcome = consumer
            .handle(&message(
                "order-status-changed",
                r#"{"orderId":1,"oldStatus":"PENDING","newStatus":"SHIPPED","createdById":7}"#,
            ))
            .await;

        assert_eq!(outcome, HandleOutcome::Logged);
    }

    #[tokio::test]
    async fn test_status_change_pushed_when_enabled() {
        let (registry, consumer, _) = setup(true);
        let mut body = registry.subscribe(7).await.into_body();
        next_text(&mut body).await;

        let outcome = consumer
            .handle(&message(
                "order-status-changed",
                r#"{"orderId":1,"oldStatus":"PENDING","newStatus":"SHIPPED","createdById":7}"#,
            ))
            .await;

        assert_eq!(outcome, HandleOutcome::Dispatched(DispatchOutcome { delivered: 1, pruned: 0 }));
        assert!(next_text(&mut body).await.starts_with("event: order-status-changed\n"));
    }

    #[tokio::test]
    async fn test_status_change_without_owner_is_only_logged() {
        let (_, consumer, _) = setup(true);

        let outcome = consumer
            .handle(&message(
                "order-status-changed",
                r#"{"orderId":1,"oldStatus":"PENDING","newStatus":"SHIPPED"}"#,
            ))
            .await;

        assert_eq!(outcome, HandleOutcome::Logged);
    }

    #[tokio::test]
    async fn test_created_order_reaches_the_creators_stream() {
        let (registry, consumer, metrics) = setup(false);
        let bus = InMemoryEventBus::new();
        let mut source = bus.subscribe(&CONSUMED_TOPICS, "notifications");

        let store = Arc::new(InMemoryOrderStore::new());
        let publisher = OrderEventPublisher::new(Arc::new(bus.clone()), metrics.clone());
        let handler = OrderCommandHandler::new(store, publisher, metrics.clone());

        let mut body = registry.subscribe(1).await.into_body();
        assert!(next_text(&mut body).await.starts_with("event: connected\n"));

        let order = handler.create(1, CreateOrder::new(100, "desc")).await.unwrap();

        let delivered = source.next_message().await.unwrap().unwrap();
        let outcome = consumer.handle(&delivered).await;
        source.acknowledge(&delivered).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Dispatched(DispatchOutcome { delivered: 1, pruned: 0 }));

        let text = next_text(&mut body).await;
        let data = text
            .strip_prefix("event: order-created\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let event: OrderCreatedEvent = serde_json::from_str(data).unwrap();
        assert_eq!(event, OrderCreatedEvent::from(&order));
        assert_eq!(event.status, OrderStatus::Pending);
        assert_eq!(event.created_by_id, 1);
        assert_eq!(event.customer_id, 100);
        assert_eq!(event.description.as_deref(), Some("desc"));
        assert_eq!(source.last_acknowledged("order-created"), Some(delivered.offset));
    }

    #[tokio::test]
    async fn test_run_acknowledges_every_message() {
        let (_, consumer, _) = setup(false);
        let bus = InMemoryEventBus::new();
        let mut source = bus.subscribe(&CONSUMED_TOPICS, "notifications");

        bus.publish_raw("order-created", Some("1"), Some(b"garbage".to_vec()));
        bus.publish_raw(
            "order-status-changed",
            Some("1"),
            Some(br#"{"orderId":1,"oldStatus":"PENDING","newStatus":"SHIPPED"}"#.to_vec()),
        );

        let run = tokio::time::timeout(Duration::from_millis(200), consumer.run(&mut source));
        let _ = run.await;

        assert_eq!(source.acknowledged_count(), 2);
        assert_eq!(source.last_acknowledged("order-created"), Some(0));
        assert_eq!(source.last_acknowledged("order-status-changed"), Some(0));
    }
}
