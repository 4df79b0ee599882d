//! Cart endpoint handlers.
//!
//! Anonymous carts are addressed by the `cartId` token; signed-in users get
//! their account cart from the session and any `cartId` they send is ignored.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use cart_sync_core::wire::{CartQuery, CartResponse, PushRequest};
use cart_sync_core::{Cart, CartToken};
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::repository::{CartOwner, StoredCart};
use crate::state::AppState;

/// Resolve who owns the addressed cart. Blank tokens count as absent.
fn owner(user: Option<CurrentUser>, cart_id: Option<CartToken>) -> CartOwner {
    match user {
        Some(user) => CartOwner::Account(user.id),
        None => CartOwner::Guest(cart_id.filter(|token| !token.is_blank())),
    }
}

fn response(stored: StoredCart) -> Json<CartResponse> {
    Json(CartResponse {
        cart_id: stored.cart_id,
        items: stored.items,
    })
}

/// `GET /cart`: current server state of the addressed cart.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<CartQuery>,
) -> Json<CartResponse> {
    let owner = owner(user, query.cart_id);
    response(state.carts().load(&owner).await)
}

/// `POST /cart`: replace the cart with the pushed lines.
///
/// Lines are priced from the catalog. Unknown products or variants are dropped,
/// duplicate lines are merged, and quantities are clamped to at least one.
#[instrument(skip(state, user, request), fields(lines = request.items.len()))]
pub async fn replace(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<PushRequest>,
) -> Json<CartResponse> {
    let owner = owner(user, request.cart_id);

    let catalog = state.catalog();
    let lines = request.items.iter().filter_map(|line| {
        let item = catalog.line(line);
        if item.is_none() {
            tracing::warn!(line = %line.key().line_id(), "Dropping unknown cart line");
        }
        item
    });
    let cart = Cart::from_items(lines);

    let stored = state.carts().replace(&owner, cart.into_items()).await;
    add_breadcrumb(
        "cart",
        "Cart replaced",
        &[
            ("cart_id", stored.cart_id.as_str()),
            ("lines", &stored.items.len().to_string()),
        ],
    );
    response(stored)
}

/// `DELETE /cart`: empty the addressed cart.
///
/// # Errors
///
/// Returns `BadRequest` for an anonymous caller without a `cartId`.
#[instrument(skip(state, user))]
pub async fn clear(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<CartQuery>,
) -> Result<StatusCode> {
    let owner = owner(user, query.cart_id);
    if owner == CartOwner::Guest(None) {
        return Err(AppError::BadRequest("cartId is required".to_string()));
    }
    state.carts().clear(&owner).await;
    Ok(StatusCode::NO_CONTENT)
}
