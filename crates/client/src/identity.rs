//! Identity transitions.
//!
//! Compares the identity observed at bootstrap with the last one recorded on
//! this client. When the user changes (including to or from a guest) the cart
//! store is reset synchronously, before any server pull runs, so a previous
//! user's cart is never visible to the next one on a shared device.

use std::sync::{Arc, Mutex, PoisonError};

use cart_sync_core::Identity;

use crate::persist::SnapshotStore;
use crate::store::CartStore;

/// Result of observing an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityTransition {
    /// Same user as before; cart and cart identifier are kept.
    Unchanged,
    /// A different user; the store was reset.
    Changed { from: Identity, to: Identity },
}

impl IdentityTransition {
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Tracks the current identity and resets the store on transitions.
pub struct IdentityManager {
    store: CartStore,
    persistence: Arc<dyn SnapshotStore>,
    state: Mutex<ObservedIdentity>,
}

struct ObservedIdentity {
    current: Identity,
    recorded: bool,
}

impl IdentityManager {
    /// Load the last recorded identity. No record compares as `Anonymous`.
    #[must_use]
    pub fn open(store: CartStore, persistence: Arc<dyn SnapshotStore>) -> Self {
        let recorded = persistence.load_identity().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load last identity");
            None
        });
        let state = ObservedIdentity {
            recorded: recorded.is_some(),
            current: recorded.unwrap_or_default(),
        };
        Self {
            store,
            persistence,
            state: Mutex::new(state),
        }
    }

    /// The identity currently driving the client.
    #[must_use]
    pub fn current(&self) -> Identity {
        self.lock_state().current.clone()
    }

    /// Run `f` with the current identity while holding the identity lock.
    ///
    /// An identity transition cannot interleave with `f`, so state read from
    /// the store inside it belongs to the identity passed in.
    pub fn with_current<R>(&self, f: impl FnOnce(&Identity) -> R) -> R {
        f(&self.lock_state().current)
    }

    /// Observe the identity for this session.
    ///
    /// Resets the store before returning when the user differs from the last
    /// observed one.
    pub fn observe(&self, identity: &Identity) -> IdentityTransition {
        let mut state = self.lock_state();

        if state.current.user_id() == identity.user_id() {
            if !state.recorded {
                self.record(identity);
                state.recorded = true;
            }
            return IdentityTransition::Unchanged;
        }

        let from = std::mem::replace(&mut state.current, identity.clone());
        self.store.reset();
        self.record(identity);
        state.recorded = true;

        tracing::info!(from = %from, to = %identity, "Identity changed, cart reset");
        IdentityTransition::Changed {
            from,
            to: identity.clone(),
        }
    }

    fn record(&self, identity: &Identity) {
        if let Err(e) = self.persistence.save_identity(identity) {
            tracing::warn!(error = %e, "Failed to persist identity");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ObservedIdentity> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
