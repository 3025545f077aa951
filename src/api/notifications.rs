use actix_web::http::header;
use actix_web::{web, HttpResponse};

use crate::notifications::SubscriberRegistry;

use super::{ApiError, CurrentUser};

/// GET /api/notifications/subscribe
pub async fn subscribe(
    user: CurrentUser,
    registry: web::Data<SubscriberRegistry>,
) -> Result<HttpResponse, ApiError> {
    if !registry.is_accepting() {
        return Err(ApiError::Unavailable);
    }

    let stream = registry.subscribe(user.0).await;

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream.into_body()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::notification_routes;
    use crate::metrics::Metrics;
    use crate::notifications::ConnectionSettings;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn registry() -> SubscriberRegistry {
        SubscriberRegistry::new(ConnectionSettings::default(), Arc::new(Metrics::new().unwrap()))
    }

    #[actix_web::test]
    async fn test_subscribe_streams_events() {
        let registry = registry();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .configure(notification_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/notifications/subscribe")
            .insert_header(("X-User-Id", "9"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(registry.connection_count(9), 1);

        // Closing the registry ends the body after what was already queued
        registry.shutdown();
        let body = test::read_body(resp).await;
        assert_eq!(
            body,
            web::Bytes::from_static(b"event: connected\ndata: Connected to notification service\n\n")
        );
    }

    #[actix_web::test]
    async fn test_subscribe_requires_user() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry()))
                .configure(notification_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/notifications/subscribe")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_subscribe_after_shutdown_is_refused() {
        let registry = registry();
        registry.shutdown();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry))
                .configure(notification_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/notifications/subscribe")
            .insert_header(("X-User-Id", "9"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
