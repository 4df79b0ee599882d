//! Cart Sync Client - Keeps a local cart convergent with the server cart.
//!
//! # Architecture
//!
//! ```text
//! UI mutation -> CartStore (sync, persisted) -> SyncScheduler (debounce)
//!             -> Reconciler::push -> POST /cart
//!
//! bootstrap   -> IdentityManager (reset on identity change)
//!             -> Reconciler::pull -> GET /cart
//! ```
//!
//! - The local cart is optimistic and always user-visible; network failures
//!   are logged and swallowed, never surfaced as errors.
//! - Pushes are full-state and serialized: at most one in flight plus one
//!   pending.
//! - Each store reset bumps an epoch; responses that started under an older
//!   epoch are discarded, so carts never leak across identities.
//!
//! # Example
//!
//! ```rust,ignore
//! use cart_sync_client::{CartEngine, ClientConfig, HttpCartApi};
//!
//! let config = ClientConfig::from_env()?;
//! let api = HttpCartApi::new(&config)?;
//! let engine = CartEngine::from_config(api, &config)?;
//!
//! engine.bootstrap(&Identity::Anonymous).await;
//! engine.add_item(CartItem::new("p1", "Tee", price));
//! engine.flush().await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod persist;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod verify;

pub use api::{CartApi, CartScope, HttpCartApi};
pub use config::{ClientConfig, ConfigError};
pub use engine::{CartEngine, SyncStatus};
pub use error::{PersistenceError, SyncError};
pub use identity::{IdentityManager, IdentityTransition};
pub use persist::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use reconcile::{PullMode, PullOutcome, PushOutcome, Reconciler};
pub use scheduler::SyncScheduler;
pub use store::CartStore;
pub use verify::ConsistencyVerifier;

#[cfg(any(test, feature = "testing"))]
pub use api::memory::InMemoryCartApi;
