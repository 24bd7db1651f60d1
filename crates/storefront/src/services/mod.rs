//! Read-only collaborators the shopping assistant's tools query.
//!
//! Each collaborator is a trait so the agent can run against Postgres in
//! production and in-memory fixtures in tests.

pub mod catalog;
pub mod orders;

pub use catalog::{CachedCatalog, CatalogError, ProductCatalog, ProductQuery, ProductResult};
pub use orders::{OrderHistory, OrderLookupError, OrderResult};
