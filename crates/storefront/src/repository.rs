//! In-memory cart storage.
//!
//! Anonymous carts are keyed by a server-minted token and expire after a
//! period without access. Account carts are keyed by user and do not expire.
//! Both live in `moka` caches so concurrent handlers need no extra locking.

use std::time::Duration;

use cart_sync_core::{CartItem, CartToken, UserId};
use moka::future::Cache;
use uuid::Uuid;

/// Upper bound on stored anonymous carts.
const MAX_GUEST_CARTS: u64 = 100_000;

/// Who owns the cart a request addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    /// Anonymous visitor with the token they presented, if any.
    Guest(Option<CartToken>),
    /// Authenticated user.
    Account(UserId),
}

/// A stored cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCart {
    pub cart_id: CartToken,
    pub items: Vec<CartItem>,
}

/// Cart storage for both anonymous and account carts.
#[derive(Clone)]
pub struct CartRepository {
    guests: Cache<CartToken, Vec<CartItem>>,
    accounts: Cache<UserId, StoredCart>,
}

impl CartRepository {
    /// Create a repository whose anonymous carts expire after `idle_ttl`
    /// without access.
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        let guests = Cache::builder()
            .max_capacity(MAX_GUEST_CARTS)
            .time_to_idle(idle_ttl)
            .build();
        let accounts = Cache::builder().build();
        Self { guests, accounts }
    }

    /// Load the owner's cart, creating an empty one if none exists.
    ///
    /// A guest presenting no token, or an unknown one, gets a freshly minted
    /// token.
    pub async fn load(&self, owner: &CartOwner) -> StoredCart {
        match owner {
            CartOwner::Guest(token) => {
                if let Some(token) = token {
                    if let Some(items) = self.guests.get(token).await {
                        return StoredCart {
                            cart_id: token.clone(),
                            items,
                        };
                    }
                }
                let cart_id = mint_token();
                self.guests.insert(cart_id.clone(), Vec::new()).await;
                tracing::debug!(cart_id = %cart_id, "Minted guest cart");
                StoredCart {
                    cart_id,
                    items: Vec::new(),
                }
            }
            CartOwner::Account(user_id) => {
                self.accounts
                    .get_with(user_id.clone(), async {
                        StoredCart {
                            cart_id: mint_token(),
                            items: Vec::new(),
                        }
                    })
                    .await
            }
        }
    }

    /// Replace the owner's items, creating the cart if needed.
    pub async fn replace(&self, owner: &CartOwner, items: Vec<CartItem>) -> StoredCart {
        let StoredCart { cart_id, .. } = self.load(owner).await;
        match owner {
            CartOwner::Guest(_) => {
                self.guests.insert(cart_id.clone(), items.clone()).await;
            }
            CartOwner::Account(user_id) => {
                let stored = StoredCart {
                    cart_id: cart_id.clone(),
                    items: items.clone(),
                };
                self.accounts.insert(user_id.clone(), stored).await;
            }
        }
        StoredCart { cart_id, items }
    }

    /// Clear the owner's cart. Anonymous carts are dropped entirely; account
    /// carts keep their identifier.
    pub async fn clear(&self, owner: &CartOwner) {
        match owner {
            CartOwner::Guest(Some(token)) => self.guests.invalidate(token).await,
            CartOwner::Guest(None) => {}
            CartOwner::Account(user_id) => {
                if let Some(mut stored) = self.accounts.get(user_id).await {
                    stored.items.clear();
                    self.accounts.insert(user_id.clone(), stored).await;
                }
            }
        }
    }

    /// Number of stored anonymous carts (approximate).
    #[must_use]
    pub fn guest_count(&self) -> u64 {
        self.guests.entry_count()
    }
}

fn mint_token() -> CartToken {
    CartToken::new(Uuid::new_v4().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn repo() -> CartRepository {
        CartRepository::new(Duration::from_secs(60))
    }

    fn tee() -> CartItem {
        CartItem::new("tee", "Classic Tee", Decimal::new(2500, 2))
    }

    #[tokio::test]
    async fn test_guest_without_token_gets_new_cart() {
        let repo = repo();
        let a = repo.load(&CartOwner::Guest(None)).await;
        let b = repo.load(&CartOwner::Guest(None)).await;
        assert_ne!(a.cart_id, b.cart_id);
        assert!(a.items.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_guest_token_is_replaced() {
        let repo = repo();
        let stale = CartToken::new("not-a-cart");
        let cart = repo.load(&CartOwner::Guest(Some(stale.clone()))).await;
        assert_ne!(cart.cart_id, stale);
    }

    #[tokio::test]
    async fn test_guest_replace_round_trip() {
        let repo = repo();
        let created = repo.replace(&CartOwner::Guest(None), vec![tee()]).await;
        let owner = CartOwner::Guest(Some(created.cart_id.clone()));

        let loaded = repo.load(&owner).await;
        assert_eq!(loaded, created);

        repo.clear(&owner).await;
        let after = repo.load(&owner).await;
        assert_ne!(after.cart_id, created.cart_id);
    }

    #[tokio::test]
    async fn test_account_cart_keeps_id_across_clear() {
        let repo = repo();
        let owner = CartOwner::Account(UserId::new("alice"));
        let created = repo.replace(&owner, vec![tee()]).await;

        repo.clear(&owner).await;
        let loaded = repo.load(&owner).await;
        assert_eq!(loaded.cart_id, created.cart_id);
        assert!(loaded.items.is_empty());
    }
}
