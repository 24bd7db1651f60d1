//! Domain models for the storefront service.

pub mod session;

pub use session::{CurrentCustomer, session_keys};
