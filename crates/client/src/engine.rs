//! The cart engine: one handle wiring store, identity, reconciliation and
//! scheduling together.
//!
//! Mutations are synchronous and visible immediately; pushes follow after the
//! debounce window. No operation returns an error for network failures: they
//! are logged and reported through outcome values so callers can keep using
//! the local cart.

use std::sync::Arc;
use std::time::Duration;

use cart_sync_core::wire::CartResponse;
use cart_sync_core::{Cart, CartItem, CartToken, Identity, LineKey};
use tokio::sync::watch;
use tracing::instrument;

use crate::api::CartApi;
use crate::config::ClientConfig;
use crate::error::{PersistenceError, SyncError};
use crate::identity::IdentityManager;
use crate::persist::{FileSnapshotStore, SnapshotStore};
use crate::reconcile::{PullMode, PullOutcome, PushOutcome, Reconciler};
use crate::scheduler::SyncScheduler;
use crate::store::CartStore;
use crate::verify::ConsistencyVerifier;

/// Point-in-time view of the sync machinery, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub identity: Identity,
    pub cart_id: Option<CartToken>,
    pub epoch: u64,
    pub revision: u64,
    /// Local changes not yet pushed.
    pub pending: bool,
    pub in_flight: bool,
}

/// Client cart with server synchronization.
pub struct CartEngine<A> {
    store: CartStore,
    identity: Arc<IdentityManager>,
    reconciler: Arc<Reconciler<A>>,
    scheduler: SyncScheduler<A>,
}

impl<A: CartApi> CartEngine<A> {
    /// Build an engine over the given transport and snapshot store.
    ///
    /// The local cart is rehydrated from `persistence` immediately.
    #[must_use]
    pub fn new(api: A, persistence: Arc<dyn SnapshotStore>, debounce: Duration) -> Self {
        let store = CartStore::open(Arc::clone(&persistence));
        let identity = Arc::new(IdentityManager::open(store.clone(), persistence));
        let reconciler = Arc::new(Reconciler::new(api, store.clone(), Arc::clone(&identity)));
        let scheduler = SyncScheduler::new(Arc::clone(&reconciler), debounce);
        Self {
            store,
            identity,
            reconciler,
            scheduler,
        }
    }

    /// Build an engine persisting to `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the state directory cannot be created.
    pub fn from_config(api: A, config: &ClientConfig) -> Result<Self, PersistenceError> {
        let persistence = FileSnapshotStore::open(config.state_dir.clone())?;
        Ok(Self::new(api, Arc::new(persistence), config.debounce))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[must_use]
    pub fn cart(&self) -> Cart {
        self.store.cart()
    }

    /// Receive the cart after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.store.subscribe()
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity.current()
    }

    #[must_use]
    pub fn cart_id(&self) -> Option<CartToken> {
        self.store.cart_id()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            identity: self.identity.current(),
            cart_id: self.store.cart_id(),
            epoch: self.store.epoch(),
            revision: self.store.revision(),
            pending: self.scheduler.is_pending(),
            in_flight: self.scheduler.in_flight(),
        }
    }

    /// Fetch the server cart without applying it.
    ///
    /// Diagnostic read used to compare local and server state; unlike the
    /// sync operations it reports failures to the caller.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn server_cart(&self) -> Result<CartResponse, SyncError> {
        self.reconciler.fetch().await
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Start a session as `identity` and load the server cart.
    ///
    /// A different identity than last observed resets the local cart before
    /// the pull is issued. If the local cart wins the initial merge it is
    /// scheduled for push.
    #[instrument(skip(self), fields(identity = %identity))]
    pub async fn bootstrap(&self, identity: &Identity) -> PullOutcome {
        if self.identity.current().user_id() != identity.user_id() {
            self.scheduler.cancel();
        }
        self.identity.observe(identity);

        let outcome = self.reconciler.pull(PullMode::Initial).await;
        if outcome == PullOutcome::LocalKept {
            self.scheduler.schedule();
        }
        outcome
    }

    /// End the authenticated session; the guest cart starts empty.
    pub async fn logout(&self) -> PullOutcome {
        self.bootstrap(&Identity::Anonymous).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add an item (merging with an existing line) and schedule a push.
    pub fn add_item(&self, item: CartItem) {
        self.store.add_item(item);
        self.scheduler.schedule();
    }

    /// Set a line's quantity, clamped to at least 1.
    pub fn update_quantity(&self, key: &LineKey, quantity: i64) -> bool {
        let updated = self.store.update_quantity(key, quantity);
        if updated {
            self.scheduler.schedule();
        }
        updated
    }

    /// Remove a line. The push that carries the removal is followed by a
    /// verification pull.
    pub fn remove_item(&self, key: &LineKey) -> bool {
        let removed = self.store.remove_item(key);
        if removed {
            self.scheduler.schedule_verify();
        }
        removed
    }

    /// Empty the cart; the empty state is pushed like any other mutation.
    pub fn clear(&self) {
        self.store.clear();
        self.scheduler.schedule();
    }

    // =========================================================================
    // Sync control
    // =========================================================================

    /// Push pending changes now. `None` if nothing was pending.
    pub async fn flush(&self) -> Option<PushOutcome> {
        self.scheduler.flush().await
    }

    /// Replace the local cart with the server cart.
    pub async fn force_reload(&self) -> PullOutcome {
        ConsistencyVerifier::new(Arc::clone(&self.reconciler), self.scheduler.clone())
            .force_reload()
            .await
    }

    /// Delete the server cart and reset local state.
    ///
    /// Pending changes are dropped. Returns `false` if the server delete
    /// failed; the local cart is reset either way.
    #[instrument(skip(self))]
    pub async fn discard(&self) -> bool {
        self.scheduler.cancel();
        self.scheduler.wait_idle().await;

        let deleted = match self.reconciler.delete().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to delete server cart");
                false
            }
        };
        self.store.reset();
        deleted
    }
}
