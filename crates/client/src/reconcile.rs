//! Server reconciliation: pull the server cart, push the local one.
//!
//! Every request captures the store epoch when it starts. A response that
//! arrives after the epoch moved (an identity change or discard reset the
//! store) is dropped without touching local state.
//!
//! Pushes are counted in a small ledger so a pull can tell whether any push
//! was outstanding while it ran. Such a pull may carry server state older than
//! the last push and is reported as [`PullOutcome::Stale`] instead of being
//! applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cart_sync_core::CartToken;
use cart_sync_core::wire::{CartResponse, PushRequest};
use tracing::instrument;

use crate::api::{CartApi, CartScope};
use crate::error::SyncError;
use crate::identity::IdentityManager;
use crate::store::CartStore;

/// How a pulled server cart is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// First load after bootstrap: adopt the server cart only if the local
    /// cart is empty; otherwise local wins and should be pushed.
    Initial,
    /// Server is ground truth: replace the local items.
    Authoritative,
}

/// What a pull did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Local cart was empty; server items adopted.
    Adopted,
    /// Local cart was non-empty (or edited during the pull) and was kept. The
    /// caller schedules a push.
    LocalKept,
    /// Both carts empty.
    Unchanged,
    /// Local items replaced with server items.
    Replaced,
    /// A push or local edit overlapped the pull; its result was dropped.
    Stale,
    /// The store was reset while the pull was outstanding.
    Superseded,
    /// The request failed; local state untouched.
    Failed,
}

impl PullOutcome {
    /// Whether server items were written into the local cart.
    #[must_use]
    pub const fn applied(self) -> bool {
        matches!(self, Self::Adopted | Self::Replaced)
    }
}

/// What a push did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Server accepted the cart; its cart id is now cached.
    Pushed { cart_id: CartToken },
    /// The store was reset while the push was outstanding.
    Superseded,
    /// The request failed; the local cart stays ahead of the server.
    Failed,
}

/// Push counters for the current epoch.
#[derive(Debug, Default)]
struct PushLedger {
    epoch: u64,
    issued: u64,
    settled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PushMark {
    issued: u64,
    settled: u64,
}

impl PushLedger {
    fn advance(&mut self, epoch: u64) {
        if epoch > self.epoch {
            *self = Self {
                epoch,
                ..Self::default()
            };
        }
    }

    const fn mark(&self) -> PushMark {
        PushMark {
            issued: self.issued,
            settled: self.settled,
        }
    }
}

/// State captured when a request starts.
struct Snapshot {
    epoch: u64,
    revision: u64,
    scope: CartScope,
}

/// Pulls and pushes the cart for the current identity.
pub struct Reconciler<A> {
    api: A,
    store: CartStore,
    identity: Arc<IdentityManager>,
    ledger: Mutex<PushLedger>,
}

impl<A: CartApi> Reconciler<A> {
    #[must_use]
    pub fn new(api: A, store: CartStore, identity: Arc<IdentityManager>) -> Self {
        Self {
            api,
            store,
            identity,
            ledger: Mutex::new(PushLedger::default()),
        }
    }

    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// The server cart the current identity addresses.
    #[must_use]
    pub fn scope(&self) -> CartScope {
        self.identity
            .with_current(|identity| CartScope::for_identity(identity, self.store.cart_id()))
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Fetch the server cart and apply it according to `mode`.
    #[instrument(skip(self))]
    pub async fn pull(&self, mode: PullMode) -> PullOutcome {
        let snapshot = self.snapshot();
        let start = self.push_mark(snapshot.epoch);

        let response = match self.api.fetch(&snapshot.scope).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    scope = ?snapshot.scope,
                    "Cart pull failed, keeping local cart"
                );
                return PullOutcome::Failed;
            }
        };

        let outcome = self.apply_pull(mode, &snapshot, start, response);
        tracing::debug!(?outcome, "Cart pull finished");
        outcome
    }

    fn apply_pull(
        &self,
        mode: PullMode,
        snapshot: &Snapshot,
        start: PushMark,
        response: CartResponse,
    ) -> PullOutcome {
        if self.store.epoch() != snapshot.epoch {
            return PullOutcome::Superseded;
        }
        let end = self.push_mark(snapshot.epoch);
        if start.issued != start.settled || end.issued != start.issued {
            return PullOutcome::Stale;
        }

        let edited = self.store.revision() != snapshot.revision;
        match mode {
            PullMode::Initial => {
                self.store.set_cart_id(response.cart_id);
                if edited || !self.store.is_empty() {
                    PullOutcome::LocalKept
                } else if response.items.is_empty() {
                    PullOutcome::Unchanged
                } else {
                    self.store.replace_items(response.items);
                    PullOutcome::Adopted
                }
            }
            PullMode::Authoritative => {
                if edited {
                    return PullOutcome::Stale;
                }
                self.store.set_cart_id(response.cart_id);
                self.store.replace_items(response.items);
                PullOutcome::Replaced
            }
        }
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Send the full current cart and cache the cart id the server returns.
    #[instrument(skip(self))]
    pub async fn push(&self) -> PushOutcome {
        let (epoch, scope, request) = self.identity.with_current(|identity| {
            let cart_id = self.store.cart_id();
            let request = PushRequest::from_cart(&self.store.cart(), cart_id.clone());
            (
                self.store.epoch(),
                CartScope::for_identity(identity, cart_id),
                request,
            )
        });

        {
            let mut ledger = self.lock_ledger();
            ledger.advance(epoch);
            if ledger.epoch == epoch {
                ledger.issued += 1;
            }
        }
        let result = self.api.push(&scope, &request).await;
        {
            let mut ledger = self.lock_ledger();
            if ledger.epoch == epoch {
                ledger.settled += 1;
            }
        }

        if self.store.epoch() != epoch {
            tracing::debug!(?scope, "Dropping push response from a previous identity");
            return PushOutcome::Superseded;
        }

        match result {
            Ok(response) => {
                tracing::debug!(
                    cart_id = %response.cart_id,
                    lines = response.items.len(),
                    "Cart pushed"
                );
                self.store.set_cart_id(response.cart_id.clone());
                PushOutcome::Pushed {
                    cart_id: response.cart_id,
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    lines = request.items.len(),
                    "Cart push failed, local cart is ahead of server"
                );
                PushOutcome::Failed
            }
        }
    }

    // =========================================================================
    // Delete and diagnostics
    // =========================================================================

    /// Clear the server cart for the current scope.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<(), SyncError> {
        let scope = self.scope();
        self.api.delete(&scope).await
    }

    /// Fetch the server cart without applying it.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn fetch(&self) -> Result<CartResponse, SyncError> {
        let scope = self.scope();
        self.api.fetch(&scope).await
    }

    fn snapshot(&self) -> Snapshot {
        self.identity.with_current(|identity| Snapshot {
            epoch: self.store.epoch(),
            revision: self.store.revision(),
            scope: CartScope::for_identity(identity, self.store.cart_id()),
        })
    }

    fn push_mark(&self, epoch: u64) -> PushMark {
        let mut ledger = self.lock_ledger();
        ledger.advance(epoch);
        ledger.mark()
    }

    fn lock_ledger(&self) -> MutexGuard<'_, PushLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use cart_sync_core::{CartItem, Identity, LineKey, UserId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::api::memory::InMemoryCartApi;
    use crate::persist::MemorySnapshotStore;

    struct Fixture {
        api: InMemoryCartApi,
        store: CartStore,
        identity: Arc<IdentityManager>,
        reconciler: Arc<Reconciler<InMemoryCartApi>>,
    }

    fn fixture() -> Fixture {
        let api = InMemoryCartApi::new();
        let persistence = Arc::new(MemorySnapshotStore::new());
        let store = CartStore::open(persistence.clone());
        let identity = Arc::new(IdentityManager::open(store.clone(), persistence));
        let reconciler = Arc::new(Reconciler::new(
            api.clone(),
            store.clone(),
            identity.clone(),
        ));
        Fixture {
            api,
            store,
            identity,
            reconciler,
        }
    }

    fn item(product: &str, quantity: u32) -> CartItem {
        CartItem::new(product, product, Decimal::ONE).with_quantity(quantity)
    }

    #[tokio::test]
    async fn test_initial_pull_adopts_server_cart_when_local_empty() {
        let f = fixture();
        f.identity.observe(&Identity::user("alice"));
        f.api.seed_account("alice", vec![item("p1", 3)]);

        let outcome = f.reconciler.pull(PullMode::Initial).await;

        assert_eq!(outcome, PullOutcome::Adopted);
        let cart = f.store.cart();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product_id.as_str(), "p1");
        assert_eq!(cart.items()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_initial_pull_keeps_non_empty_local_cart() {
        let f = fixture();
        f.identity.observe(&Identity::user("alice"));
        f.api.seed_account("alice", vec![item("p2", 5)]);
        f.store.add_item(item("p1", 1));

        let outcome = f.reconciler.pull(PullMode::Initial).await;

        assert_eq!(outcome, PullOutcome::LocalKept);
        let cart = f.store.cart();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product_id.as_str(), "p1");
        assert!(f.store.cart_id().is_some());
    }

    #[tokio::test]
    async fn test_guest_pull_caches_minted_cart_id() {
        let f = fixture();
        f.identity.observe(&Identity::Anonymous);

        assert_eq!(
            f.reconciler.pull(PullMode::Initial).await,
            PullOutcome::Unchanged
        );
        assert_eq!(f.store.cart_id(), Some(CartToken::new("cart-1")));
        assert_eq!(
            f.reconciler.scope(),
            CartScope::Guest(Some(CartToken::new("cart-1")))
        );
    }

    #[tokio::test]
    async fn test_push_overwrites_cached_cart_id() {
        let f = fixture();
        f.store.set_cart_id(CartToken::new("expired"));
        f.store.add_item(item("p1", 2));

        let outcome = f.reconciler.push().await;

        let PushOutcome::Pushed { cart_id } = outcome else {
            panic!("expected push to succeed, got {outcome:?}");
        };
        assert_ne!(cart_id.as_str(), "expired");
        assert_eq!(f.store.cart_id(), Some(cart_id));
    }

    #[tokio::test]
    async fn test_push_failure_keeps_local_state() {
        let f = fixture();
        f.store.add_item(item("p1", 2));
        f.api.fail_next_pushes(1);

        assert_eq!(f.reconciler.push().await, PushOutcome::Failed);
        assert_eq!(f.store.cart().item_count(), 2);
        assert!(f.store.cart_id().is_none());
    }

    #[tokio::test]
    async fn test_pull_failure_keeps_local_state() {
        let f = fixture();
        f.store.add_item(item("p1", 2));
        f.api.fail_next_fetches(1);

        assert_eq!(
            f.reconciler.pull(PullMode::Authoritative).await,
            PullOutcome::Failed
        );
        assert_eq!(f.store.cart().item_count(), 2);
    }

    #[tokio::test]
    async fn test_pull_overlapping_push_is_stale() {
        let f = fixture();
        f.identity.observe(&Identity::user("alice"));
        f.api.seed_account("alice", vec![item("p1", 1), item("p2", 1)]);
        f.store.replace_items(vec![item("p1", 1), item("p2", 1)]);
        f.store.remove_item(&LineKey::product("p2".into()));

        f.api.hold_fetches();
        let pull = tokio::spawn({
            let reconciler = f.reconciler.clone();
            async move { reconciler.pull(PullMode::Authoritative).await }
        });
        while f.api.fetches_started() == 0 {
            tokio::task::yield_now().await;
        }

        // The removal lands on the server while the fetch is still held.
        assert!(matches!(
            f.reconciler.push().await,
            PushOutcome::Pushed { .. }
        ));
        f.api.release_fetches();

        assert_eq!(pull.await.unwrap(), PullOutcome::Stale);
        assert_eq!(f.store.cart().items().len(), 1);
    }

    #[tokio::test]
    async fn test_response_after_reset_is_discarded() {
        let f = fixture();
        f.identity.observe(&Identity::user("alice"));
        f.store.add_item(item("p1", 2));

        f.api.hold_pushes();
        let push = tokio::spawn({
            let reconciler = f.reconciler.clone();
            async move { reconciler.push().await }
        });
        while f.api.pushes_started() == 0 {
            tokio::task::yield_now().await;
        }

        f.identity.observe(&Identity::user("bob"));
        f.api.release_pushes();

        assert_eq!(push.await.unwrap(), PushOutcome::Superseded);
        assert!(f.store.is_empty());
        assert!(f.store.cart_id().is_none());
        assert_eq!(
            f.api.pushes()[0].0,
            CartScope::Account(UserId::new("alice"))
        );
    }
}
