use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    producer::{FutureProducer, FutureRecord},
    types::RDKafkaErrorCode,
    util::Timeout,
    Message, Offset, TopicPartitionList,
};
use std::time::Duration;

use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

use super::{BusError, BusMessage, EventBus, EventSource};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

fn classify(err: KafkaError) -> BusError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageSizeTooLarge)
        | Some(RDKafkaErrorCode::InvalidMessage)
        | Some(RDKafkaErrorCode::TopicAuthorizationFailed)
        | Some(RDKafkaErrorCode::UnknownTopicOrPartition) => BusError::Rejected(err.to_string()),
        _ => BusError::Transport(err.to_string()),
    }
}

// ============================================================================
// Producer
// ============================================================================

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Redpanda producer: {}", e))?;

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda", CircuitBreakerConfig::default()),
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

#[async_trait]
impl EventBus for RedpandaClient {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| classify(e))
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %topic, "Circuit breaker open - Redpanda unavailable");
                Err(BusError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::warn!(error = %e, topic = %topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================
//
// Auto-commit is off: an offset is committed only after the notification side
// has handled the message, so a crash in between redelivers it.
//
// ============================================================================

pub struct RedpandaSource {
    consumer: StreamConsumer,
    group_id: String,
}

impl RedpandaSource {
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Redpanda consumer: {}", e))?;

        consumer
            .subscribe(topics)
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to {:?}: {}", topics, e))?;

        tracing::info!(
            topics = ?topics,
            consumer_group = %group_id,
            manual_commit = true,
            "Subscribed to Redpanda topics"
        );

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
        })
    }
}

/// librdkafka reports an unrecoverable client state as `Fatal`; the
/// consumer instance is unusable afterwards
fn is_fatal(error: &KafkaError) -> bool {
    error.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

#[async_trait]
impl EventSource for RedpandaSource {
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        let received = match self.consumer.recv().await {
            Ok(message) => Ok(BusMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: message.payload().map(|p| p.to_vec()),
            }),
            Err(e) if is_fatal(&e) => {
                tracing::error!(
                    consumer_group = %self.group_id,
                    error = %e,
                    "Fatal Redpanda consumer error, closing source"
                );
                return None;
            }
            Err(e) => Err(BusError::Transport(e.to_string())),
        };
        Some(received)
    }

    async fn acknowledge(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))?;

        tracing::trace!(
            consumer_group = %self.group_id,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Committed offset"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::IsTransient;

    #[test]
    fn test_oversized_message_is_permanent() {
        let err = classify(KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge));
        assert!(matches!(err, BusError::Rejected(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_only_fatal_errors_end_the_source() {
        assert!(is_fatal(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)));
        assert!(!is_fatal(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerTransportFailure
        )));
        assert!(!is_fatal(&KafkaError::NoMessageReceived));
    }

    #[test]
    fn test_timeouts_are_transient() {
        let err = classify(KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut));
        assert!(err.is_transient());
    }
}
