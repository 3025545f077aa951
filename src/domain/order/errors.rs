use crate::store::StoreError;

use super::value_objects::OrderId;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),

    #[error("Order not found with id: {0}")]
    NotFound(OrderId),

    #[error("Order store failure: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrderError::Validation(message.into())
    }
}
