use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::domain::order::OrderError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing X-User-Id header")]
    MissingUser,

    #[error("Invalid X-User-Id header: {0}")]
    InvalidUser(String),

    #[error("Notification service is shutting down")]
    Unavailable,

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingUser | ApiError::InvalidUser(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            // Unknown ids are a client error here, not 404
            ApiError::Order(OrderError::Validation(_) | OrderError::NotFound(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Order(OrderError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Order(OrderError::Store(e)) => {
                tracing::error!(error = %e, "Order store failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}
