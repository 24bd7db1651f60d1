//! HTTP middleware stack for the storefront service.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Customer identity (`OptionalAuth` extractor, per handler)

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, set_current_customer};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
