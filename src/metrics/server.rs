use actix::Addr;
use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::actors::{GetSystemHealth, HealthMonitorActor, HealthStatus};

use super::Metrics;

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// GET /health - aggregated component health
pub async fn health_handler(monitor: web::Data<Addr<HealthMonitorActor>>) -> impl Responder {
    let health = match monitor.send(GetSystemHealth).await {
        Ok(health) => health,
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            return HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "order-notify",
            }));
        }
    };

    let components: serde_json::Map<String, serde_json::Value> = health
        .components
        .iter()
        .map(|(name, component)| {
            (
                name.clone(),
                serde_json::json!({
                    "status": component.status.label(),
                    "details": component.details,
                    "lastCheck": component.last_check,
                }),
            )
        })
        .collect();

    let body = serde_json::json!({
        "status": health.overall_status.label(),
        "service": "order-notify",
        "components": components,
        "checkTime": health.check_time,
    });

    match health.overall_status {
        HealthStatus::Unhealthy(_) => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::Ok().json(body),
    }
}
