//! Core types for Stephan's Pet Store.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;

use thiserror::Error;

/// Errors from parsing stored or user-supplied values into core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid order status: {0}")]
    OrderStatus(String),
    #[error("unsupported currency: {0}")]
    Currency(String),
}
