//! `getMyOrders` - the signed-in customer's order history.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, instrument};

use stephans_core::{OrderStatus, UserId};

use super::{ToolError, ensure_object, optional_str};
use crate::agent::identity::AgentIdentity;
use crate::claude::Tool;
use crate::services::OrderHistory;

/// Tool name as the model sees it.
pub const NAME: &str = "getMyOrders";

const NO_ORDERS_MESSAGE: &str = "The customer has no orders matching this filter.";

/// Order lookup capability bound to one customer.
///
/// Can only be built from an authenticated identity, so an anonymous request
/// never holds one.
#[derive(Clone)]
pub struct GetMyOrdersTool {
    orders: Arc<dyn OrderHistory>,
    user_id: UserId,
}

impl GetMyOrdersTool {
    /// Build the tool for `identity`, or `None` if nobody is signed in.
    #[must_use]
    pub fn for_identity(identity: &AgentIdentity, orders: Arc<dyn OrderHistory>) -> Option<Self> {
        identity.user_id().map(|user_id| Self {
            orders,
            user_id: user_id.clone(),
        })
    }

    /// Definition sent to the model.
    #[must_use]
    pub fn definition() -> Tool {
        let mut statuses: Vec<&str> = vec![""];
        statuses.extend(OrderStatus::ALL.into_iter().map(OrderStatus::as_str));

        Tool {
            name: NAME.to_string(),
            description: "Get the signed-in customer's orders, newest first, with status, \
                items, total and a link to each order."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": statuses,
                        "description": "Optional status filter. Empty string for all orders."
                    }
                }
            }),
        }
    }

    /// List the customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidInput` for an unknown status and
    /// `ToolError::Orders` if the lookup fails.
    #[instrument(skip(self, input), fields(user_id = %self.user_id))]
    pub async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        let status = parse_status(input)?;
        let orders = self.orders.list_orders(&self.user_id, status).await?;

        info!(status = ?status, results = orders.len(), "Order lookup completed");

        let mut output = json!({
            "totalOrders": orders.len(),
            "orders": orders,
        });
        if orders.is_empty() {
            output["message"] = json!(NO_ORDERS_MESSAGE);
        }

        Ok(output)
    }
}

/// Read the optional status filter; `""` and missing mean all orders.
fn parse_status(input: &Value) -> Result<Option<OrderStatus>, ToolError> {
    ensure_object(input)?;

    match optional_str(input, "status")?.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .to_lowercase()
            .parse::<OrderStatus>()
            .map(Some)
            .map_err(|e| ToolError::InvalidInput(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use stephans_core::Price;

    use super::*;
    use crate::services::{OrderLookupError, OrderResult};

    #[derive(Default)]
    struct FakeOrders {
        calls: Mutex<Vec<(UserId, Option<OrderStatus>)>>,
        orders: Vec<OrderResult>,
    }

    #[async_trait]
    impl OrderHistory for FakeOrders {
        async fn list_orders(
            &self,
            user_id: &UserId,
            status: Option<OrderStatus>,
        ) -> Result<Vec<OrderResult>, OrderLookupError> {
            self.calls.lock().expect("lock").push((user_id.clone(), status));
            Ok(self.orders.clone())
        }
    }

    #[test]
    fn test_not_built_for_anonymous() {
        let orders: Arc<dyn OrderHistory> = Arc::new(FakeOrders::default());
        assert!(GetMyOrdersTool::for_identity(&AgentIdentity::anonymous(), orders).is_none());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(&json!({})).expect("ok"), None);
        assert_eq!(parse_status(&json!({"status": ""})).expect("ok"), None);
        assert_eq!(
            parse_status(&json!({"status": "Shipped"})).expect("ok"),
            Some(OrderStatus::Shipped)
        );
        assert!(parse_status(&json!({"status": "refunded"})).is_err());
    }

    #[test]
    fn test_definition_lists_status_enum() {
        let tool = GetMyOrdersTool::definition();
        assert_eq!(
            tool.input_schema["properties"]["status"]["enum"],
            json!(["", "pending", "paid", "shipped", "delivered", "cancelled"])
        );
    }

    #[tokio::test]
    async fn test_invoke_scopes_to_identity() {
        let fake = Arc::new(FakeOrders {
            orders: vec![OrderResult::new(
                Uuid::nil(),
                "ORD-1001",
                OrderStatus::Paid,
                Price::tzs(Decimal::from(52_000)),
                vec!["Leather Dog Collar".to_string()],
                Utc::now(),
            )],
            ..Default::default()
        });
        let identity = AgentIdentity::authenticated(UserId::new("user_123"));
        let tool = GetMyOrdersTool::for_identity(&identity, fake.clone()).expect("tool");

        let output = tool.invoke(&json!({"status": "paid"})).await.expect("invoke");

        assert_eq!(output["totalOrders"], 1);
        assert_eq!(output["orders"][0]["statusDisplay"], "✅ Paid");
        let calls = fake.calls.lock().expect("lock");
        assert_eq!(calls[0], (UserId::new("user_123"), Some(OrderStatus::Paid)));
    }

    #[tokio::test]
    async fn test_invoke_no_orders_has_message() {
        let identity = AgentIdentity::authenticated(UserId::new("user_456"));
        let tool = GetMyOrdersTool::for_identity(&identity, Arc::new(FakeOrders::default()))
            .expect("tool");

        let output = tool.invoke(&json!({"status": ""})).await.expect("invoke");
        assert_eq!(output["totalOrders"], 0);
        assert!(output["message"].is_string());
    }
}
