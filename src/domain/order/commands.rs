use serde::Deserialize;

use super::errors::OrderError;
use super::value_objects::{CustomerId, OrderStatus};

// ============================================================================
// Order Commands - caller input, validated before anything is persisted
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub customer_id: Option<CustomerId>,
    pub description: Option<String>,
}

/// Input that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCreateOrder {
    pub customer_id: CustomerId,
    pub description: String,
}

impl CreateOrder {
    pub fn new(customer_id: CustomerId, description: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id),
            description: Some(description.into()),
        }
    }

    pub fn validate(self) -> Result<ValidCreateOrder, OrderError> {
        let customer_id = self
            .customer_id
            .ok_or_else(|| OrderError::validation("Customer id is required"))?;

        let description = match self.description {
            Some(d) if !d.trim().is_empty() => d,
            _ => return Err(OrderError::validation("Description is required")),
        };

        Ok(ValidCreateOrder {
            customer_id,
            description,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderStatus {
    pub status: Option<OrderStatus>,
}

impl UpdateOrderStatus {
    pub fn validate(self) -> Result<OrderStatus, OrderError> {
        self.status
            .ok_or_else(|| OrderError::validation("Status is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_create() {
        let valid = CreateOrder::new(100, "desc").validate().unwrap();
        assert_eq!(valid.customer_id, 100);
        assert_eq!(valid.description, "desc");
    }

    #[test]
    fn test_missing_customer_is_rejected() {
        let cmd = CreateOrder {
            customer_id: None,
            description: Some("desc".to_string()),
        };
        assert!(matches!(cmd.validate(), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_blank_or_missing_description_is_rejected() {
        for description in [None, Some(String::new()), Some("   \t".to_string())] {
            let cmd = CreateOrder {
                customer_id: Some(100),
                description,
            };
            assert!(matches!(cmd.validate(), Err(OrderError::Validation(_))));
        }
    }

    #[test]
    fn test_update_requires_status() {
        let missing: UpdateOrderStatus = serde_json::from_str("{}").unwrap();
        assert!(matches!(missing.validate(), Err(OrderError::Validation(_))));

        let present: UpdateOrderStatus = serde_json::from_str(r#"{"status":"SHIPPED"}"#).unwrap();
        assert_eq!(present.validate().unwrap(), OrderStatus::Shipped);
    }
}
