use async_trait::async_trait;
use std::sync::Arc;

use crate::actors::core::{ComponentHealth, HealthProbe, HealthStatus};
use crate::messaging::RedpandaClient;
use crate::metrics::Metrics;
use crate::notifications::SubscriberRegistry;
use crate::utils::CircuitState;

/// Producer health, read from its circuit breaker
pub struct EventBusProbe {
    client: Arc<RedpandaClient>,
    metrics: Arc<Metrics>,
}

impl EventBusProbe {
    pub fn new(client: Arc<RedpandaClient>, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }
}

pub(crate) fn circuit_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

#[async_trait]
impl HealthProbe for EventBusProbe {
    fn component_name(&self) -> &'static str {
        "redpanda"
    }

    async fn check_health(&self) -> ComponentHealth {
        let state = self.client.circuit_state().await;
        self.metrics.circuit_breaker_state.set(state.as_gauge());

        ComponentHealth::new(self.component_name(), circuit_health(state))
    }
}

/// Push registry health: accepting connections or draining
pub struct PushRegistryProbe {
    registry: SubscriberRegistry,
}

impl PushRegistryProbe {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HealthProbe for PushRegistryProbe {
    fn component_name(&self) -> &'static str {
        "push_registry"
    }

    async fn check_health(&self) -> ComponentHealth {
        let status = if self.registry.is_accepting() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy("Shutting down".to_string())
        };

        ComponentHealth::new(self.component_name(), status).with_details(format!(
            "{} connections for {} users",
            self.registry.total_connections(),
            self.registry.user_count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::ConnectionSettings;

    #[test]
    fn test_circuit_mapping() {
        assert!(circuit_health(CircuitState::Closed).is_healthy());
        assert_eq!(circuit_health(CircuitState::HalfOpen).label(), "degraded");
        assert!(circuit_health(CircuitState::Open).is_unhealthy());
    }

    #[tokio::test]
    async fn test_registry_probe_reports_shutdown() {
        let registry = SubscriberRegistry::new(
            ConnectionSettings::default(),
            Arc::new(Metrics::new().unwrap()),
        );
        let probe = PushRegistryProbe::new(registry.clone());

        let health = probe.check_health().await;
        assert!(health.status.is_healthy());
        assert_eq!(health.details.as_deref(), Some("0 connections for 0 users"));

        registry.shutdown();
        assert!(probe.check_health().await.status.is_unhealthy());
    }
}
