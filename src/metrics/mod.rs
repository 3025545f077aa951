// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::{health_handler, metrics_handler};

// ============================================================================
// Metrics - Prometheus metrics for the order/notification pipeline
// ============================================================================
//
// - Order lifecycle (creations, status changes)
// - Publication to the event bus (success, failure per topic)
// - Consumption (handled and poison messages per topic)
// - Push delivery (frames delivered, connections pruned, open connections)
//
// Scraped via GET /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Orders
    pub orders_created: IntCounter,
    pub order_status_changes: IntCounterVec,

    // Publication
    pub events_published: IntCounterVec,
    pub events_publish_failed: IntCounterVec,
    pub circuit_breaker_state: IntGauge,

    // Consumption
    pub events_consumed: IntCounterVec,
    pub events_poison: IntCounterVec,

    // Delivery
    pub notifications_delivered: IntCounterVec,
    pub connections_pruned: IntCounterVec,
    pub push_connections_open: IntGauge,
    pub dispatch_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_status_changes = IntCounterVec::new(
            Opts::new("order_status_changes_total", "Total order status updates"),
            &["new_status"],
        )?;
        registry.register(Box::new(order_status_changes.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events appended to the event bus"),
            &["topic"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_publish_failed = IntCounterVec::new(
            Opts::new(
                "events_publish_failed_total",
                "Events lost after the order was committed",
            ),
            &["topic"],
        )?;
        registry.register(Box::new(events_publish_failed.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Producer circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Events read from the event bus"),
            &["topic"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let events_poison = IntCounterVec::new(
            Opts::new("events_poison_total", "Undecodable events skipped"),
            &["topic"],
        )?;
        registry.register(Box::new(events_poison.clone()))?;

        let notifications_delivered = IntCounterVec::new(
            Opts::new("notifications_delivered_total", "Frames written to push connections"),
            &["event"],
        )?;
        registry.register(Box::new(notifications_delivered.clone()))?;

        let connections_pruned = IntCounterVec::new(
            Opts::new("connections_pruned_total", "Push connections removed from the registry"),
            &["reason"],
        )?;
        registry.register(Box::new(connections_pruned.clone()))?;

        let push_connections_open = IntGauge::new(
            "push_connections_open",
            "Currently registered push connections",
        )?;
        registry.register(Box::new(push_connections_open.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Time to fan one event out to a user")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 2.0]),
            &["event"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_status_changes,
            events_published,
            events_publish_failed,
            circuit_breaker_state,
            events_consumed,
            events_poison,
            notifications_delivered,
            connections_pruned,
            push_connections_open,
            dispatch_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_published(&self, topic: &str, success: bool) {
        if success {
            self.events_published.with_label_values(&[topic]).inc();
        } else {
            self.events_publish_failed.with_label_values(&[topic]).inc();
        }
    }

    pub fn record_consumed(&self, topic: &str, poison: bool) {
        self.events_consumed.with_label_values(&[topic]).inc();
        if poison {
            self.events_poison.with_label_values(&[topic]).inc();
        }
    }

    pub fn record_dispatch(&self, event: &str, delivered: usize, duration_secs: f64) {
        self.notifications_delivered
            .with_label_values(&[event])
            .inc_by(delivered as u64);
        self.dispatch_duration
            .with_label_values(&[event])
            .observe(duration_secs);
    }

    pub fn record_connection_opened(&self) {
        self.push_connections_open.inc();
    }

    pub fn record_connection_closed(&self, reason: &str) {
        self.push_connections_open.dec();
        self.connections_pruned.with_label_values(&[reason]).inc();
    }
}
