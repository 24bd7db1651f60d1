//! Stephan's Pet Store storefront service.
//!
//! Hosts "Sky", the shopping assistant behind `POST /api/chat`. The binary in
//! `main.rs` wires configuration, the database and Sentry around the router
//! built here, so integration tests can drive the same router with scripted
//! collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod agent;
pub mod claude;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, middleware::from_fn};

use state::AppState;

/// Router with request IDs and application state, but no session layer.
///
/// The caller adds the session layer so tests can use an in-memory store.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(from_fn(middleware::request_id_middleware))
        .with_state(state)
}
