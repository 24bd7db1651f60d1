//! Product repository backing the catalog search.
//!
//! Queries are built at runtime with `query_as` so the crate compiles
//! without a live database.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use stephans_core::{CurrencyCode, Price, ProductSlug};

use super::RepositoryError;
use crate::services::catalog::{CatalogError, PAGE_SIZE, ProductCatalog, ProductQuery, ProductResult};

const SEARCH_SQL: &str = r"
SELECT p.name, p.slug, p.price, p.currency_code, p.description, p.stock,
       c.name AS category
FROM storefront.product p
JOIN storefront.category c ON c.id = p.category_id
WHERE p.is_active
  AND NOT EXISTS (
      SELECT 1 FROM unnest($1::text[]) AS term
      WHERE NOT (p.name ILIKE '%' || term || '%'
              OR p.description ILIKE '%' || term || '%'
              OR c.name ILIKE '%' || term || '%')
  )
  AND ($2::text IS NULL
       OR c.name ILIKE '%' || $2 || '%'
       OR c.slug ILIKE '%' || $2 || '%')
  AND ($3::numeric IS NULL OR p.price >= $3)
  AND ($4::numeric IS NULL OR p.price <= $4)
ORDER BY (p.stock > 0) DESC, p.name
LIMIT $5
";

#[derive(Debug, FromRow)]
struct ProductRow {
    name: String,
    slug: String,
    price: Decimal,
    currency_code: String,
    description: String,
    stock: i32,
    category: String,
}

impl TryFrom<ProductRow> for ProductResult {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let currency: CurrencyCode = row.currency_code.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.slug))
        })?;

        Ok(Self::new(
            row.name,
            &ProductSlug::new(row.slug),
            Price::new(row.price, currency),
            row.category,
            row.description,
            row.stock,
        ))
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Search active products.
    ///
    /// Every search term must appear in the product name, description or
    /// category name. In-stock products sort first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row has an unknown currency.
    pub async fn search(
        &self,
        query: &ProductQuery,
        limit: usize,
    ) -> Result<Vec<ProductResult>, RepositoryError> {
        let terms: Vec<String> = query.terms().iter().map(String::as_str).map(escape_like).collect();
        let category = query.category.as_deref().map(escape_like);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<ProductRow> = sqlx::query_as(SEARCH_SQL)
            .bind(terms)
            .bind(category)
            .bind(query.min_price)
            .bind(query.max_price)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(ProductResult::try_from).collect()
    }
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Catalog collaborator over the storefront database.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PostgresCatalog {
    #[instrument(skip(self))]
    async fn search(&self, query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
        Ok(ProductRepository::new(&self.pool)
            .search(query, PAGE_SIZE)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("dog food"), "dog food");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
    }

    #[test]
    fn test_row_conversion() {
        let row = ProductRow {
            name: "Orthopedic Dog Bed".to_string(),
            slug: "orthopedic-dog-bed".to_string(),
            price: Decimal::from(185_000),
            currency_code: "TZS".to_string(),
            description: "Memory foam bed for senior dogs".to_string(),
            stock: 0,
            category: "Beds & Bedding".to_string(),
        };

        let product = ProductResult::try_from(row).expect("convert");
        assert_eq!(product.price_formatted, "TZS 185,000");
        assert_eq!(product.stock_message, "Out of stock");
        assert_eq!(product.product_url, "/products/orthopedic-dog-bed");
    }

    #[test]
    fn test_row_conversion_rejects_unknown_currency() {
        let row = ProductRow {
            name: "Bowl".to_string(),
            slug: "bowl".to_string(),
            price: Decimal::from(5),
            currency_code: "EUR".to_string(),
            description: String::new(),
            stock: 4,
            category: "Bowls".to_string(),
        };

        assert!(matches!(
            ProductResult::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
