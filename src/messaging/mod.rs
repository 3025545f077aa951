// ============================================================================
// Messaging - event bus contract and adapters
// ============================================================================
//
// - EventBus:     append a serialized event to a topic (producer side)
// - EventSource:  pull messages for a consumer group, acknowledge when handled
//
// Adapters:
// - redpanda: Kafka-compatible broker through rdkafka
// - memory:   in-process bus with consumer-group semantics
//
// ============================================================================

mod memory;
mod publisher;
mod redpanda;

use async_trait::async_trait;

use crate::utils::IsTransient;

pub use memory::{InMemoryEventBus, InMemorySource};
pub use publisher::OrderEventPublisher;
pub use redpanda::{RedpandaClient, RedpandaSource};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Circuit breaker open for event bus")]
    CircuitOpen,

    /// The broker refused the message; sending it again will not help
    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Event bus transport error: {0}")]
    Transport(String),

    #[error("Failed to acknowledge message: {0}")]
    Commit(String),
}

impl IsTransient for BusError {
    fn is_transient(&self) -> bool {
        matches!(self, BusError::Transport(_))
    }
}

/// A message as read from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// At-least-once append of `payload` to `topic`
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError>;
}

#[async_trait]
pub trait EventSource: Send {
    /// Next message for this consumer; `None` once the source is closed
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>>;

    /// Mark `message` as handled so it is not delivered to the group again
    async fn acknowledge(&mut self, message: &BusMessage) -> Result<(), BusError>;
}
