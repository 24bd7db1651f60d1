//! Order repository backing the order-history lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use stephans_core::{CurrencyCode, OrderStatus, Price, UserId};

use super::RepositoryError;
use crate::services::orders::{OrderHistory, OrderLookupError, OrderResult};

/// Most recent orders returned per lookup.
const ORDER_LIMIT: i64 = 20;

const LIST_SQL: &str = r#"
SELECT o.id, o.order_number, o.status, o.total, o.currency_code, o.created_at,
       COALESCE(
           array_agg(i.product_name ORDER BY i.id) FILTER (WHERE i.id IS NOT NULL),
           '{}'::text[]
       ) AS item_names
FROM storefront."order" o
LEFT JOIN storefront.order_item i ON i.order_id = o.id
WHERE o.user_id = $1
  AND ($2::text IS NULL OR o.status = $2)
GROUP BY o.id
ORDER BY o.created_at DESC
LIMIT $3
"#;

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    status: String,
    total: Decimal,
    currency_code: String,
    created_at: DateTime<Utc>,
    item_names: Vec<String>,
}

impl TryFrom<OrderRow> for OrderResult {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", row.id)))?;
        let currency: CurrencyCode = row
            .currency_code
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", row.id)))?;

        Ok(Self::new(
            row.id,
            row.order_number,
            status,
            Price::new(row.total, currency),
            row.item_names,
            row.created_at,
        ))
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a user's most recent orders, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row has an unknown status or currency.
    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderResult>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(LIST_SQL)
            .bind(user_id.as_str())
            .bind(status.map(OrderStatus::as_str))
            .bind(ORDER_LIMIT)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(OrderResult::try_from).collect()
    }
}

/// Order history collaborator over the storefront database.
#[derive(Clone)]
pub struct PostgresOrderHistory {
    pool: PgPool,
}

impl PostgresOrderHistory {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderHistory for PostgresOrderHistory {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_orders(
        &self,
        user_id: &UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderResult>, OrderLookupError> {
        Ok(OrderRepository::new(&self.pool)
            .list_for_user(user_id, status)
            .await?)
    }
}
