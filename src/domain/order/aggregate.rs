use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{CustomerId, OrderId, OrderStatus, UserId};

// ============================================================================
// Order - persisted record and its state machine
// ============================================================================
//
// Everything except `status` is fixed at creation. Status only moves through
// `transition_to`, which reports the change so the caller can publish it.
//
// Any status is a legal target from any status. No transition graph is
// enforced.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub created_by_id: UserId,
    pub customer_id: CustomerId,
    pub description: Option<String>,
}

/// An order that has not been persisted yet; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub status: OrderStatus,
    pub created_by_id: UserId,
    pub customer_id: CustomerId,
    pub description: Option<String>,
}

impl NewOrder {
    /// Every order starts out pending
    pub fn pending(created_by_id: UserId, customer_id: CustomerId, description: String) -> Self {
        Self {
            status: OrderStatus::Pending,
            created_by_id,
            customer_id,
            description: Some(description),
        }
    }

    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            created_at,
            status: self.status,
            created_by_id: self.created_by_id,
            customer_id: self.customer_id,
            description: self.description,
        }
    }
}

/// Result of applying a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub old: OrderStatus,
    pub new: OrderStatus,
}

impl Order {
    pub fn transition_to(&mut self, new_status: OrderStatus) -> StatusTransition {
        let old = self.status;
        self.status = new_status;
        StatusTransition { old, new: new_status }
    }
}
