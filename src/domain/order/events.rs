use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{Order, StatusTransition};
use super::value_objects::{CustomerId, OrderId, OrderStatus, UserId};

// ============================================================================
// Order Events - published to the event bus, one topic per event type
// ============================================================================
//
// Field names are part of the wire contract shared with other services.
// Decoding ignores unknown fields so producers may add fields freely.
//
// ============================================================================

pub const ORDER_CREATED_TOPIC: &str = "order-created";
pub const ORDER_STATUS_CHANGED_TOPIC: &str = "order-status-changed";

/// Common behaviour of events published by the order service
pub trait DomainEvent: Serialize {
    /// Topic the event is appended to (also used as the push frame name)
    fn topic(&self) -> &'static str;

    fn order_id(&self) -> OrderId;
}

/// Order Created - emitted once per successful create
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub created_by_id: UserId,
    pub customer_id: CustomerId,
    pub description: Option<String>,
}

impl From<&Order> for OrderCreatedEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            created_at: order.created_at,
            status: order.status,
            created_by_id: order.created_by_id,
            customer_id: order.customer_id,
            description: order.description.clone(),
        }
    }
}

impl DomainEvent for OrderCreatedEvent {
    fn topic(&self) -> &'static str {
        ORDER_CREATED_TOPIC
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Order Status Changed - emitted once per status update call
///
/// `created_by_id` is absent on events from producers that predate it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChangedEvent {
    pub order_id: OrderId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<UserId>,
}

impl OrderStatusChangedEvent {
    pub fn from_transition(order: &Order, transition: StatusTransition) -> Self {
        Self {
            order_id: order.id,
            old_status: transition.old,
            new_status: transition.new,
            created_by_id: Some(order.created_by_id),
        }
    }
}

impl DomainEvent for OrderStatusChangedEvent {
    fn topic(&self) -> &'static str {
        ORDER_STATUS_CHANGED_TOPIC
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Any event the notification side knows how to consume
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(OrderCreatedEvent),
    StatusChanged(OrderStatusChangedEvent),
}
