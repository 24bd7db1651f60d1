//! Tools the shopping assistant can call.
//!
//! Tool failures never abort a chat turn. They are reported back to the model
//! as an error payload, which it narrates to the customer.

pub mod get_my_orders;
pub mod search_products;

use serde_json::{Value, json};
use thiserror::Error;

use crate::services::{CatalogError, OrderLookupError};

pub use get_my_orders::GetMyOrdersTool;
pub use search_products::SearchProductsTool;

/// Errors raised while executing a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model sent arguments that violate the tool's contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The catalog search failed.
    #[error("catalog search failed: {0}")]
    Catalog(#[from] CatalogError),

    /// The order lookup failed.
    #[error("order lookup failed: {0}")]
    Orders(#[from] OrderLookupError),

    /// The model asked for a tool this request does not have.
    #[error("tool not available: {0}")]
    NotAvailable(String),
}

impl ToolError {
    /// Message safe to show the model and the customer.
    ///
    /// Backend failures are reported generically; input problems are echoed so
    /// the model can explain them.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(_) | Self::NotAvailable(_) => self.to_string(),
            Self::Catalog(_) => {
                "Product search is temporarily unavailable. Apologize and suggest trying again shortly."
                    .to_string()
            }
            Self::Orders(_) => {
                "Order history is temporarily unavailable. Apologize and suggest trying again shortly."
                    .to_string()
            }
        }
    }

    /// Error payload handed back to the model.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({ "error": self.public_message() })
    }
}

/// Read an optional string argument. `null` and missing are both `None`.
fn optional_str<'a>(input: &'a Value, field: &str) -> Result<Option<&'a str>, ToolError> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ToolError::InvalidInput(format!(
            "{field} must be a string, got {other}"
        ))),
    }
}

/// Tool arguments must be a JSON object (or absent).
fn ensure_object(input: &Value) -> Result<(), ToolError> {
    match input {
        Value::Object(_) | Value::Null => Ok(()),
        other => Err(ToolError::InvalidInput(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hides_backend_details() {
        let err = ToolError::Catalog(CatalogError::Unavailable("connection refused".to_string()));
        let payload = err.payload();
        let message = payload["error"].as_str().expect("message");
        assert!(message.contains("temporarily unavailable"));
        assert!(!message.contains("connection refused"));
    }

    #[test]
    fn test_payload_echoes_input_problems() {
        let err = ToolError::NotAvailable("getMyOrders".to_string());
        assert_eq!(err.payload(), json!({"error": "tool not available: getMyOrders"}));
    }

    #[test]
    fn test_optional_str() {
        let input = json!({"query": "bed", "category": null, "minPrice": 3});
        assert_eq!(optional_str(&input, "query").expect("ok"), Some("bed"));
        assert_eq!(optional_str(&input, "category").expect("ok"), None);
        assert_eq!(optional_str(&input, "missing").expect("ok"), None);
        assert!(optional_str(&input, "minPrice").is_err());
    }
}
