//! HTTP route handlers for the cart server.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                - Health check
//!
//! # Cart
//! GET    /cart[?cartId=<token>] - Current cart
//! POST   /cart                  - Replace cart with the pushed lines
//! DELETE /cart[?cartId=<token>] - Empty cart
//!
//! # Development auth (STOREFRONT_DEV_LOGIN=true)
//! POST   /auth/login            - Sign in as { "userId": ... }
//! POST   /auth/logout           - Sign out
//! ```

pub mod auth;
pub mod cart;

use axum::{
    Router,
    http::Uri,
    routing::{get, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new().route(
        "/cart",
        get(cart::show).post(cart::replace).delete(cart::clear),
    )
}

/// Create the development auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create all routes for the cart server.
pub fn routes(dev_login: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/health", get(health))
        .merge(cart_routes())
        .fallback(not_found);

    if dev_login {
        router.nest("/auth", auth_routes())
    } else {
        router
    }
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
