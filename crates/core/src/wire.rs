//! Request and response bodies of the `/cart` endpoint.
//!
//! ```text
//! GET    /cart[?cartId=<token>]  -> CartResponse
//! POST   /cart  PushRequest      -> CartResponse
//! DELETE /cart[?cartId=<token>]  -> 204
//! ```
//!
//! Authenticated callers omit `cartId`; the server resolves their cart from the
//! session. Pushes carry only `(productId, variantId, quantity)` per line since
//! price, name, and image are never trusted from the client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::Cart;
use crate::types::{CartItem, CartToken, LineKey, ProductId, VariantId};

/// A response that parsed as JSON but violates the endpoint contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("response is missing a cart id")]
    MissingCartId,
    #[error("line {0} has zero quantity")]
    ZeroQuantity(String),
    #[error("line has an empty product id")]
    EmptyProductId,
}

/// Query string for `GET /cart` and `DELETE /cart`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<CartToken>,
}

/// Server cart state returned by every cart endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub cart_id: CartToken,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl CartResponse {
    /// Check the invariants a well-behaved server guarantees.
    ///
    /// # Errors
    ///
    /// Returns `WireError` if the cart id is blank, a product id is blank, or a
    /// line has zero quantity.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.cart_id.is_blank() {
            return Err(WireError::MissingCartId);
        }
        for item in &self.items {
            if item.product_id.is_blank() {
                return Err(WireError::EmptyProductId);
            }
            if item.quantity == 0 {
                return Err(WireError::ZeroQuantity(item.key().line_id()));
            }
        }
        Ok(())
    }
}

/// One line of a full-state push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl PushLine {
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }
}

impl From<&CartItem> for PushLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
        }
    }
}

/// Body of `POST /cart`: the complete desired item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// `null` when the client has no cart identifier yet.
    pub cart_id: Option<CartToken>,
    pub items: Vec<PushLine>,
}

impl PushRequest {
    /// Build a full-state push from the current cart.
    #[must_use]
    pub fn from_cart(cart: &Cart, cart_id: Option<CartToken>) -> Self {
        Self {
            cart_id,
            items: cart.items().iter().map(PushLine::from).collect(),
        }
    }
}
