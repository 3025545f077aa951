// ============================================================================
// HTTP API (actix-web)
// ============================================================================
//
// POST /api/orders                      create an order (X-User-Id)
// GET  /api/orders?activeOnly=bool      list own orders (X-User-Id)
// PUT  /api/orders/{id}/status          change status
// GET  /api/notifications/subscribe     push stream (X-User-Id)
// GET  /health, GET /metrics
//
// ============================================================================

mod error;
mod notifications;
mod orders;
mod user;

use actix_web::{web, HttpResponse};

pub use error::ApiError;
pub use user::{CurrentUser, USER_ID_HEADER};

use crate::metrics::{health_handler, metrics_handler};

/// Order endpoints; needs `web::Data<OrderCommandHandler>`
pub fn order_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/orders")
            .app_data(json_config())
            .route("", web::post().to(orders::create_order))
            .route("", web::get().to(orders::list_orders))
            .route("/{id}/status", web::put().to(orders::update_status)),
    );
}

/// Push endpoint; needs `web::Data<SubscriberRegistry>`
pub fn notification_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/notifications/subscribe",
        web::get().to(notifications::subscribe),
    );
}

/// Needs `web::Data<Arc<Metrics>>` and `web::Data<Addr<HealthMonitorActor>>`
pub fn operational_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Malformed bodies answer with the same `{"error": ...}` shape as domain errors
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        actix_web::error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(serde_json::json!({ "error": message })),
        )
        .into()
    })
}
