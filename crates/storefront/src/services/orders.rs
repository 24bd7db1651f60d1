//! Order history lookup for signed-in customers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use stephans_core::{OrderStatus, Price, UserId};

use crate::db::RepositoryError;

/// Errors raised while listing a customer's orders.
#[derive(Debug, Error)]
pub enum OrderLookupError {
    /// The backing store failed.
    #[error("order lookup failed: {0}")]
    Repository(#[from] RepositoryError),
}

/// An order as presented to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    /// Glyph and label, e.g. `"📦 Shipped"`.
    pub status_display: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub total_formatted: String,
    pub item_count: usize,
    pub item_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Canonical storefront path, `/orders/{id}`.
    pub order_url: String,
}

impl OrderResult {
    /// Build a result, deriving the display fields and URL.
    #[must_use]
    pub fn new(
        id: Uuid,
        order_number: impl Into<String>,
        status: OrderStatus,
        total: Price,
        item_names: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            status,
            status_display: status.display(),
            total: total.amount,
            total_formatted: total.display(),
            item_count: item_names.len(),
            item_names,
            created_at,
            order_url: format!("/orders/{id}"),
        }
    }
}

/// Order history collaborator.
#[async_trait]
pub trait OrderHistory: Send + Sync {
    /// List a customer's orders, newest first, optionally filtered by status.
    ///
    /// A customer with no orders gets an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Returns `OrderLookupError` if the backing store fails.
    async fn list_orders(
        &self,
        user_id: &UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderResult>, OrderLookupError>;
}
