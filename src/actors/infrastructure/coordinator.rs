use actix::prelude::*;
use std::time::Duration;

use crate::actors::core::HealthStatus;
use crate::notifications::SubscriberRegistry;

use super::event_consumer::StopActor;
use super::{EventConsumerActor, GetSystemHealth, HealthMonitorActor};

// ============================================================================
// Coordinator Actor - Orchestrates all system actors
// ============================================================================
//
// Responsibilities:
// - Starts the event consumer (when this instance runs the notifier role)
// - Logs aggregated system health on an interval
// - Coordinates graceful shutdown: push connections first, then children
//
// Actor Hierarchy:
//   CoordinatorActor (Supervisor)
//   ├── HealthMonitorActor (shared with the HTTP layer)
//   └── EventConsumerActor (optional)
//
// ============================================================================

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub struct CoordinatorActor {
    registry: SubscriberRegistry,
    health_monitor: Addr<HealthMonitorActor>,
    pending_consumer: Option<EventConsumerActor>,
    event_consumer: Option<Addr<EventConsumerActor>>,
}

impl CoordinatorActor {
    pub fn new(registry: SubscriberRegistry, health_monitor: Addr<HealthMonitorActor>) -> Self {
        Self {
            registry,
            health_monitor,
            pending_consumer: None,
            event_consumer: None,
        }
    }

    pub fn with_consumer(mut self, consumer: EventConsumerActor) -> Self {
        self.pending_consumer = Some(consumer.with_health_monitor(self.health_monitor.clone()));
        self
    }

    fn start_child_actors(&mut self, _ctx: &mut Context<Self>) {
        tracing::info!("Starting supervised child actors");

        if let Some(consumer) = self.pending_consumer.take() {
            self.event_consumer = Some(consumer.start());
        }

        tracing::info!(
            event_consumer = self.event_consumer.is_some(),
            "All supervised actors started"
        );
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("CoordinatorActor started");
        self.start_child_actors(ctx);

        ctx.run_interval(HEALTH_LOG_INTERVAL, |act, _ctx| {
            let health_monitor = act.health_monitor.clone();
            actix::spawn(async move {
                match health_monitor.send(GetSystemHealth).await {
                    Ok(health) => match health.overall_status {
                        HealthStatus::Healthy => {
                            tracing::debug!("System health check: Healthy");
                        }
                        HealthStatus::Degraded(ref msg) => {
                            tracing::warn!("System health check: Degraded - {}", msg);
                        }
                        HealthStatus::Unhealthy(ref msg) => {
                            tracing::error!("System health check: Unhealthy - {}", msg);
                        }
                    },
                    Err(e) => {
                        tracing::error!("Failed to get system health: {}", e);
                    }
                }
            });
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Close every push connection and stop the children; replies with the
/// number of connections closed
#[derive(Message)]
#[rtype(result = "usize")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = usize;

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");

        let closed = self.registry.shutdown();

        if let Some(ref event_consumer) = self.event_consumer {
            event_consumer.do_send(StopActor);
        }

        ctx.stop();
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryEventBus;
    use crate::metrics::Metrics;
    use crate::notifications::{ConnectionSettings, NotificationConsumer, CONSUMED_TOPICS};
    use futures_util::StreamExt;
    use std::sync::Arc;

    #[actix::test]
    async fn test_shutdown_drains_push_connections() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = SubscriberRegistry::new(ConnectionSettings::default(), metrics.clone());
        let bus = InMemoryEventBus::new();
        let monitor = HealthMonitorActor::new().start();

        let consumer = EventConsumerActor::new(
            NotificationConsumer::new(registry.clone(), metrics),
            Box::new(bus.subscribe(&CONSUMED_TOPICS, "notifications")),
        );
        let coordinator = CoordinatorActor::new(registry.clone(), monitor)
            .with_consumer(consumer)
            .start();

        let mut body = registry.subscribe(1).await.into_body();
        let _other = registry.subscribe(2).await;
        body.next().await.unwrap().unwrap();

        let closed = coordinator.send(Shutdown).await.unwrap();

        assert_eq!(closed, 2);
        assert!(!registry.is_accepting());
        assert!(body.next().await.is_none());
    }
}
