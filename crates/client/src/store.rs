//! The client cart store.
//!
//! Holds the current [`Cart`] behind a `tokio::sync::watch` channel so readers
//! can `subscribe()` and observe every change. Each mutation persists the
//! item list through the injected [`SnapshotStore`] before returning.
//!
//! Besides the cart itself the store tracks:
//! - the cached cart identifier (persisted separately from items),
//! - a local revision, bumped by user mutations only, and
//! - an epoch, bumped by [`CartStore::reset`] on identity changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cart_sync_core::{Cart, CartItem, CartToken, LineKey};
use tokio::sync::watch;

use crate::persist::SnapshotStore;

/// Shared handle to the client cart state.
///
/// Cheap to clone; all clones observe the same cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    cart: watch::Sender<Cart>,
    cart_id: Mutex<Option<CartToken>>,
    revision: AtomicU64,
    epoch: AtomicU64,
    persistence: Arc<dyn SnapshotStore>,
}

impl CartStore {
    /// Open the store, rehydrating items and cart identifier from the snapshot.
    ///
    /// Unreadable snapshots are logged and treated as empty.
    #[must_use]
    pub fn open(persistence: Arc<dyn SnapshotStore>) -> Self {
        let items = persistence.load_items().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load cart snapshot, starting empty");
            None
        });
        let cart_id = persistence.load_cart_id().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load cart id");
            None
        });

        let cart = items.map(Cart::from_items).unwrap_or_default();
        tracing::debug!(
            lines = cart.items().len(),
            has_cart_id = cart_id.is_some(),
            "Cart store rehydrated"
        );

        let (sender, _) = watch::channel(cart);
        Self {
            inner: Arc::new(StoreInner {
                cart: sender,
                cart_id: Mutex::new(cart_id),
                revision: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                persistence,
            }),
        }
    }

    /// A copy of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner.cart.borrow().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.cart.borrow().is_empty()
    }

    /// Receive the cart after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.inner.cart.subscribe()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add an item, merging with an existing line of the same key.
    pub fn add_item(&self, item: CartItem) {
        self.mutate(|cart| {
            cart.add_item(item);
            true
        });
    }

    /// Set a line's quantity (clamped to at least 1). Returns `false` if the
    /// key is not in the cart.
    pub fn update_quantity(&self, key: &LineKey, quantity: i64) -> bool {
        self.mutate(|cart| cart.update_quantity(key, quantity))
    }

    /// Remove the line with exactly this key. Returns `false` if absent.
    pub fn remove_item(&self, key: &LineKey) -> bool {
        self.mutate(|cart| cart.remove_item(key))
    }

    /// Remove every line.
    pub fn clear(&self) {
        self.mutate(|cart| {
            cart.clear();
            true
        });
    }

    /// Replace all items with a server-provided list.
    ///
    /// Does not bump the local revision: this is reconciliation, not a user
    /// edit.
    pub(crate) fn replace_items(&self, items: Vec<CartItem>) {
        let persistence = &self.inner.persistence;
        self.inner.cart.send_modify(|cart| {
            *cart = Cart::from_items(items);
            persist_items(persistence.as_ref(), cart);
        });
    }

    fn mutate(&self, f: impl FnOnce(&mut Cart) -> bool) -> bool {
        let persistence = &self.inner.persistence;
        let changed = self.inner.cart.send_if_modified(|cart| {
            let changed = f(cart);
            if changed {
                persist_items(persistence.as_ref(), cart);
            }
            changed
        });
        if changed {
            self.inner.revision.fetch_add(1, Ordering::SeqCst);
        }
        changed
    }

    // =========================================================================
    // Cart identifier
    // =========================================================================

    /// The cached server cart identifier.
    #[must_use]
    pub fn cart_id(&self) -> Option<CartToken> {
        self.lock_cart_id().clone()
    }

    /// Cache the identifier returned by the server, overwriting any prior one.
    pub(crate) fn set_cart_id(&self, cart_id: CartToken) {
        let mut slot = self.lock_cart_id();
        if slot.as_ref() == Some(&cart_id) {
            return;
        }
        if let Err(e) = self.inner.persistence.save_cart_id(&cart_id) {
            tracing::warn!(error = %e, "Failed to persist cart id");
        }
        *slot = Some(cart_id);
    }

    fn discard_cart_id(&self) {
        let mut slot = self.lock_cart_id();
        if let Err(e) = self.inner.persistence.clear_cart_id() {
            tracing::warn!(error = %e, "Failed to clear persisted cart id");
        }
        *slot = None;
    }

    fn lock_cart_id(&self) -> std::sync::MutexGuard<'_, Option<CartToken>> {
        self.inner
            .cart_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Epoch and revision
    // =========================================================================

    /// Clear items and cart identifier and start a new epoch.
    ///
    /// Network responses for requests started before the reset are discarded
    /// by comparing epochs.
    pub fn reset(&self) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.discard_cart_id();
        let persistence = &self.inner.persistence;
        self.inner.cart.send_modify(|cart| {
            cart.clear();
            persist_items(persistence.as_ref(), cart);
        });
        self.inner.revision.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(epoch, "Cart store reset");
    }

    /// Current epoch. Changes only on [`CartStore::reset`].
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Count of local mutations so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }
}

fn persist_items(persistence: &dyn SnapshotStore, cart: &Cart) {
    if let Err(e) = persistence.save_items(cart.items()) {
        tracing::warn!(error = %e, "Failed to persist cart snapshot");
    }
}
