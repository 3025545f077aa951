use actix::prelude::*;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod config;
mod domain;
mod messaging;
mod metrics;
mod notifications;
mod store;
mod utils;

use actors::{
    CoordinatorActor, EventBusProbe, EventConsumerActor, HealthMonitorActor, PushRegistryProbe,
    Shutdown,
};
use config::AppConfig;
use domain::order::OrderCommandHandler;
use messaging::{
    EventBus, EventSource, InMemoryEventBus, OrderEventPublisher, RedpandaClient, RedpandaSource,
};
use notifications::{NotificationConsumer, SubscriberRegistry, CONSUMED_TOPICS};
use store::{InMemoryOrderStore, OrderStore, PgOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_notify=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(role = ?config.role, bind = %config.http_bind, "Starting order notification service");

    // === 1. Metrics and push registry ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    let registry = SubscriberRegistry::new(config.connection.clone(), metrics.clone());

    let mut health_monitor =
        HealthMonitorActor::new().with_probe(Arc::new(PushRegistryProbe::new(registry.clone())));

    // === 2. Event bus (Redpanda, or in-process when no brokers are configured) ===
    let (bus, in_memory_bus): (Arc<dyn EventBus>, Option<InMemoryEventBus>) =
        match config.kafka_brokers.as_deref() {
            Some(brokers) => {
                tracing::info!(brokers = brokers, "Connecting to Redpanda");
                let client = Arc::new(RedpandaClient::new(brokers)?);
                health_monitor = health_monitor
                    .with_probe(Arc::new(EventBusProbe::new(client.clone(), metrics.clone())));
                (client, None)
            }
            None => {
                tracing::warn!("KAFKA_BROKERS not set, using the in-process event bus");
                let bus = InMemoryEventBus::new();
                (Arc::new(bus.clone()), Some(bus))
            }
        };

    let health_monitor = health_monitor.start();

    // === 3. Order store ===
    let order_store: Arc<dyn OrderStore> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgOrderStore::connect(url).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    let handler = OrderCommandHandler::new(
        order_store,
        OrderEventPublisher::new(bus, metrics.clone()),
        metrics.clone(),
    );

    // === 4. Coordinator (owns the consumer when this instance delivers notifications) ===
    let mut coordinator = CoordinatorActor::new(registry.clone(), health_monitor.clone());

    if config.role.runs_notifications() {
        if in_memory_bus.is_some() && !config.role.runs_orders() {
            tracing::warn!("Notifications role on the in-process bus will never receive events");
        }

        let source = event_source(&config, in_memory_bus.as_ref())?;
        let consumer = NotificationConsumer::new(registry.clone(), metrics.clone())
            .with_status_changes(config.dispatch_status_changes);
        coordinator = coordinator.with_consumer(EventConsumerActor::new(consumer, source));
    }

    let coordinator = coordinator.start();

    // === 5. HTTP server ===
    let role = config.role;
    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::Data::new(health_monitor.clone()))
            .configure(api::operational_routes);

        if role.runs_orders() {
            app = app
                .app_data(web::Data::new(handler.clone()))
                .configure(api::order_routes);
        }
        if role.runs_notifications() {
            app = app
                .app_data(web::Data::new(registry.clone()))
                .configure(api::notification_routes);
        }
        app
    })
    .bind(&config.http_bind)?
    .disable_signals()
    .run();

    // Push streams never finish on their own, so drain them before stopping
    let server_handle = server.handle();
    actix_web::rt::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");

        match coordinator.send(Shutdown).await {
            Ok(closed) => tracing::info!(closed = closed, "Push connections drained"),
            Err(e) => tracing::warn!(error = %e, "Coordinator unavailable during shutdown"),
        }
        server_handle.stop(true).await;
    });

    tracing::info!(bind = %config.http_bind, "HTTP server listening");
    server.await?;

    tracing::info!("Order notification service stopped");
    Ok(())
}

fn event_source(
    config: &AppConfig,
    in_memory_bus: Option<&InMemoryEventBus>,
) -> anyhow::Result<Box<dyn EventSource>> {
    match (in_memory_bus, config.kafka_brokers.as_deref()) {
        (Some(bus), _) => Ok(Box::new(bus.subscribe(&CONSUMED_TOPICS, &config.consumer_group))),
        (None, Some(brokers)) => Ok(Box::new(RedpandaSource::new(
            brokers,
            &config.consumer_group,
            &CONSUMED_TOPICS,
        )?)),
        (None, None) => anyhow::bail!("no event bus configured"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
