//! Product catalog search.
//!
//! Results are cached for 5 minutes per normalized filter using `moka`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use stephans_core::{Price, ProductSlug, StockStatus};

use crate::db::RepositoryError;

/// Maximum products returned by a single search.
pub const PAGE_SIZE: usize = 20;

/// Errors raised while searching the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store failed.
    #[error("catalog query failed: {0}")]
    Repository(#[from] RepositoryError),

    /// The catalog is temporarily unreachable.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Normalized catalog search filter.
///
/// Empty strings become `None`, text is trimmed and lowercased, and a zero
/// price bound means unbounded. Two filters that mean the same search compare
/// equal, which makes this usable as a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    /// Free-text search terms.
    pub query: Option<String>,
    /// Category name (or part of one).
    pub category: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<Decimal>,
    /// Inclusive upper price bound.
    pub max_price: Option<Decimal>,
}

impl ProductQuery {
    /// Build a normalized filter.
    #[must_use]
    pub fn new(
        query: Option<&str>,
        category: Option<&str>,
        min_price: Option<Decimal>,
        max_price: Option<Decimal>,
    ) -> Self {
        Self {
            query: normalize_text(query),
            category: normalize_text(category),
            min_price: min_price.filter(|p| !p.is_zero()),
            max_price: max_price.filter(|p| !p.is_zero()),
        }
    }

    /// Individual search terms, split on whitespace.
    #[must_use]
    pub fn terms(&self) -> Vec<String> {
        self.query
            .as_deref()
            .map(|q| q.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// A catalog item as presented to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResult {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// e.g. `"TZS 24,700"`
    pub price_formatted: String,
    pub category: String,
    pub description: String,
    pub stock_status: StockStatus,
    /// e.g. `"Only 3 left in stock"`
    pub stock_message: String,
    /// Canonical storefront path, `/products/{slug}`.
    pub product_url: String,
}

impl ProductResult {
    /// Build a result, deriving the formatted price, stock fields and URL.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        slug: &ProductSlug,
        price: Price,
        category: impl Into<String>,
        description: impl Into<String>,
        stock: i32,
    ) -> Self {
        Self {
            name: name.into(),
            price: price.amount,
            price_formatted: price.display(),
            category: category.into(),
            description: description.into(),
            stock_status: StockStatus::from_stock(stock),
            stock_message: StockStatus::message(stock),
            product_url: format!("/products/{slug}"),
        }
    }
}

/// Catalog search collaborator.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Search the catalog.
    ///
    /// An all-empty filter is valid and returns the first page of products.
    /// At most [`PAGE_SIZE`] results are returned.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the backing store fails.
    async fn search(&self, query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError>;
}

/// Caching wrapper around another catalog.
///
/// Only successful searches are cached; failures always reach the inner catalog
/// again on the next call.
pub struct CachedCatalog<C> {
    inner: C,
    cache: Cache<ProductQuery, Arc<Vec<ProductResult>>>,
}

impl<C: ProductCatalog> CachedCatalog<C> {
    /// Wrap `inner` with a 5-minute cache.
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_ttl(inner, Duration::from_secs(300))
    }

    /// Wrap `inner` with a cache of the given time-to-live.
    #[must_use]
    pub fn with_ttl(inner: C, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl<C: ProductCatalog> ProductCatalog for CachedCatalog<C> {
    #[instrument(skip(self))]
    async fn search(&self, query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
        if let Some(cached) = self.cache.get(query).await {
            debug!("Cache hit for product search");
            return Ok(cached.as_ref().clone());
        }

        let products = self.inner.search(query).await?;
        self.cache
            .insert(query.clone(), Arc::new(products.clone()))
            .await;
        Ok(products)
    }
}
