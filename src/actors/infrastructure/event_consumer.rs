use actix::prelude::*;
use tokio::task::JoinHandle;

use crate::actors::core::HealthStatus;
use crate::messaging::EventSource;
use crate::notifications::NotificationConsumer;

use super::{HealthMonitorActor, UpdateHealth};

// ============================================================================
// Event Consumer Actor - drives the notification consumer loop
// ============================================================================
//
// The consume loop runs as its own task so a slow dispatch never blocks the
// actor's mailbox. Stopping the actor aborts the task; messages that were
// read but not acknowledged are redelivered to the group.
//
// ============================================================================

const COMPONENT: &str = "event_consumer";

pub struct EventConsumerActor {
    consumer: NotificationConsumer,
    source: Option<Box<dyn EventSource>>,
    health_monitor: Option<Addr<HealthMonitorActor>>,
    task: Option<JoinHandle<()>>,
}

impl EventConsumerActor {
    pub fn new(consumer: NotificationConsumer, source: Box<dyn EventSource>) -> Self {
        Self {
            consumer,
            source: Some(source),
            health_monitor: None,
            task: None,
        }
    }

    pub fn with_health_monitor(mut self, health_monitor: Addr<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    fn report(&self, status: HealthStatus, details: &str) {
        if let Some(ref health_monitor) = self.health_monitor {
            health_monitor.do_send(UpdateHealth {
                component: COMPONENT.to_string(),
                status,
                details: Some(details.to_string()),
            });
        }
    }
}

impl Actor for EventConsumerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let Some(mut source) = self.source.take() else {
            tracing::error!("EventConsumerActor started without an event source");
            ctx.stop();
            return;
        };

        let consumer = self.consumer.clone();
        let health_monitor = self.health_monitor.clone();

        self.task = Some(actix::spawn(async move {
            consumer.run(source.as_mut()).await;

            // The source only ends when the bus connection is gone
            if let Some(health_monitor) = health_monitor {
                health_monitor.do_send(UpdateHealth {
                    component: COMPONENT.to_string(),
                    status: HealthStatus::Unhealthy("Event source closed".to_string()),
                    details: None,
                });
            }
        }));

        self.report(HealthStatus::Healthy, "Consuming order events");
        tracing::info!("EventConsumerActor started");
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::info!("EventConsumerActor stopped");
    }
}

/// Message to gracefully stop an actor
#[derive(Message)]
#[rtype(result = "()")]
pub struct StopActor;

impl Handler<StopActor> for EventConsumerActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("EventConsumerActor received stop signal");
        ctx.stop();
    }
}
