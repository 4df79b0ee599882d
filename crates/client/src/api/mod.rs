//! Access to the server cart endpoint.
//!
//! [`CartApi`] is the seam between reconciliation logic and transport.
//! [`HttpCartApi`] talks to a real `/cart` endpoint; `InMemoryCartApi`
//! (behind the `testing` feature) models the same contract in-process.

mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use std::future::Future;

use cart_sync_core::wire::{CartResponse, PushRequest};
use cart_sync_core::{CartToken, Identity, UserId};

pub use http::HttpCartApi;

use crate::error::SyncError;

/// Which server cart a request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartScope {
    /// Anonymous visitor, addressed by cart token (if one has been minted).
    Guest(Option<CartToken>),
    /// Authenticated user; the server resolves the cart from the session.
    Account(UserId),
}

impl CartScope {
    /// Scope for the given identity and cached cart token.
    #[must_use]
    pub fn for_identity(identity: &Identity, cart_id: Option<CartToken>) -> Self {
        match identity {
            Identity::Anonymous => Self::Guest(cart_id),
            Identity::Authenticated { user_id } => Self::Account(user_id.clone()),
        }
    }

    /// Token to put in the query string. `None` for account scopes.
    #[must_use]
    pub const fn query_cart_id(&self) -> Option<&CartToken> {
        match self {
            Self::Guest(cart_id) => cart_id.as_ref(),
            Self::Account(_) => None,
        }
    }
}

/// Transport for the `/cart` endpoint contract.
///
/// Implementations return validated responses: a response that parses but
/// violates the contract is an `Err(SyncError::Malformed)`.
pub trait CartApi: Clone + Send + Sync + 'static {
    /// `GET /cart[?cartId]`.
    fn fetch(
        &self,
        scope: &CartScope,
    ) -> impl Future<Output = Result<CartResponse, SyncError>> + Send;

    /// `POST /cart` with the full desired item list.
    fn push(
        &self,
        scope: &CartScope,
        request: &PushRequest,
    ) -> impl Future<Output = Result<CartResponse, SyncError>> + Send;

    /// `DELETE /cart[?cartId]`.
    fn delete(&self, scope: &CartScope) -> impl Future<Output = Result<(), SyncError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_for_identity() {
        let token = Some(CartToken::new("tok"));
        assert_eq!(
            CartScope::for_identity(&Identity::Anonymous, token.clone()),
            CartScope::Guest(token.clone())
        );

        let scope = CartScope::for_identity(&Identity::user("u1"), token);
        assert_eq!(scope, CartScope::Account(UserId::new("u1")));
        assert!(scope.query_cart_id().is_none());
    }
}
