//! Reference cart server.
//!
//! Serves `GET/POST/DELETE /cart` with server-side pricing from a product
//! catalog, in-memory cart storage, and cookie sessions. The library form lets
//! the router be driven directly from tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Build the application router with its session and tracing layers.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    routes::routes(state.config().dev_login)
        .layer(session_layer)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::trace_layer())
        .with_state(state)
}
