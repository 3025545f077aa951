use std::sync::Arc;

use crate::domain::order::DomainEvent;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

use super::{BusError, EventBus};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Serializes order events and appends them to their topic
///
/// The record key is the order id, so all events of one order land on the
/// same partition and keep their relative order.
#[derive(Clone)]
pub struct OrderEventPublisher {
    bus: Arc<dyn EventBus>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl OrderEventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, metrics: Arc<Metrics>) -> Self {
        Self {
            bus,
            retry: RetryConfig::conservative(),
            metrics,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn publish<E: DomainEvent + Sync>(&self, event: &E) -> Result<(), PublishError> {
        let topic = event.topic();
        let key = event.order_id().to_string();
        let payload = serde_json::to_string(event)?;

        let result = retry_on_transient(self.retry.clone(), |attempt| {
            let bus = self.bus.clone();
            let key = key.as_str();
            let payload = payload.as_str();
            async move {
                tracing::trace!(attempt = attempt, topic = topic, "Publishing event");
                bus.publish(topic, key, payload).await
            }
        })
        .await
        .into_result();

        self.metrics.record_published(topic, result.is_ok());

        match result {
            Ok(()) => {
                tracing::info!(topic = topic, order_id = %key, "Published order event");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderStatus, OrderStatusChangedEvent};
    use crate::messaging::InMemoryEventBus;

    fn changed() -> OrderStatusChangedEvent {
        OrderStatusChangedEvent {
            order_id: 12,
            old_status: OrderStatus::Pending,
            new_status: OrderStatus::Confirmed,
            created_by_id: Some(1),
        }
    }

    #[tokio::test]
    async fn test_event_is_keyed_by_order_and_routed_by_type() {
        let bus = InMemoryEventBus::new();
        let publisher = OrderEventPublisher::new(Arc::new(bus.clone()), Arc::new(Metrics::new().unwrap()));

        publisher.publish(&changed()).await.unwrap();

        let messages = bus.published("order-status-changed");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key.as_deref(), Some("12"));

        let decoded: OrderStatusChangedEvent =
            serde_json::from_slice(messages[0].payload.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, changed());
    }

    #[tokio::test]
    async fn test_bus_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_publishes(true);
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = OrderEventPublisher::new(Arc::new(bus.clone()), metrics.clone())
            .with_retry(RetryConfig::none());

        let result = publisher.publish(&changed()).await;

        assert!(matches!(result, Err(PublishError::Bus(BusError::Transport(_)))));
        assert_eq!(
            metrics
                .events_publish_failed
                .with_label_values(&["order-status-changed"])
                .get(),
            1
        );
    }
}
