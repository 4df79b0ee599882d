//! Persisted client-side cart state.
//!
//! # Layout
//!
//! ```text
//! <state_dir>/
//! ├── cart.json       {"version": 1, "items": [...]}
//! ├── cart_id         bare cart token
//! └── identity.json   last observed identity
//! ```
//!
//! Only line items are persisted; totals are recomputed on load. A snapshot
//! whose `version` differs from [`SNAPSHOT_VERSION`], or that fails to parse,
//! is discarded and the cart starts empty.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use cart_sync_core::{CartItem, CartToken, Identity};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Current schema version of `cart.json`.
pub const SNAPSHOT_VERSION: u32 = 1;

const ITEMS_FILE: &str = "cart.json";
const CART_ID_FILE: &str = "cart_id";
const IDENTITY_FILE: &str = "identity.json";

/// Storage for the client cart snapshot.
///
/// Calls are synchronous: persistence is a side effect of each store
/// mutation and completes before the mutation returns.
pub trait SnapshotStore: Send + Sync {
    /// Load persisted items. `Ok(None)` means nothing usable was stored.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the snapshot exists but cannot be read.
    fn load_items(&self) -> Result<Option<Vec<CartItem>>, PersistenceError>;

    /// Replace the persisted items.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the snapshot cannot be written.
    fn save_items(&self, items: &[CartItem]) -> Result<(), PersistenceError>;

    /// Load the cached cart identifier.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the identifier exists but cannot be read.
    fn load_cart_id(&self) -> Result<Option<CartToken>, PersistenceError>;

    /// Overwrite the cached cart identifier.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the identifier cannot be written.
    fn save_cart_id(&self, cart_id: &CartToken) -> Result<(), PersistenceError>;

    /// Forget the cached cart identifier.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the identifier cannot be removed.
    fn clear_cart_id(&self) -> Result<(), PersistenceError>;

    /// Load the last identity observed on this client.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the record exists but cannot be read.
    fn load_identity(&self) -> Result<Option<Identity>, PersistenceError>;

    /// Record the identity observed on this client.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the record cannot be written.
    fn save_identity(&self, identity: &Identity) -> Result<(), PersistenceError>;
}

#[derive(Serialize)]
struct ItemsRecordRef<'a> {
    version: u32,
    items: &'a [CartItem],
}

#[derive(Deserialize)]
struct ItemsRecord {
    items: Vec<CartItem>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

// =============================================================================
// FileSnapshotStore
// =============================================================================

/// Snapshot store backed by files in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Open (creating if needed) a snapshot directory.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(self.path(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_optional(&self, name: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `data` to `path` via a temp file and rename so readers never see a
/// partial snapshot.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapshot");
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let mut file = std::fs::File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

impl SnapshotStore for FileSnapshotStore {
    fn load_items(&self) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        let Some(contents) = self.read_optional(ITEMS_FILE)? else {
            return Ok(None);
        };

        match serde_json::from_str::<VersionProbe>(&contents) {
            Ok(probe) if probe.version == SNAPSHOT_VERSION => {}
            Ok(probe) => {
                tracing::info!(
                    found = probe.version,
                    expected = SNAPSHOT_VERSION,
                    "Discarding cart snapshot with different schema version"
                );
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cart snapshot");
                return Ok(None);
            }
        }

        match serde_json::from_str::<ItemsRecord>(&contents) {
            Ok(record) => Ok(Some(record.items)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding cart snapshot with invalid items");
                Ok(None)
            }
        }
    }

    fn save_items(&self, items: &[CartItem]) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(&ItemsRecordRef {
            version: SNAPSHOT_VERSION,
            items,
        })?;
        write_atomic(&self.path(ITEMS_FILE), &json)
    }

    fn load_cart_id(&self) -> Result<Option<CartToken>, PersistenceError> {
        Ok(self
            .read_optional(CART_ID_FILE)?
            .map(|raw| CartToken::new(raw.trim()))
            .filter(|token| !token.is_blank()))
    }

    fn save_cart_id(&self, cart_id: &CartToken) -> Result<(), PersistenceError> {
        write_atomic(&self.path(CART_ID_FILE), cart_id.as_str().as_bytes())
    }

    fn clear_cart_id(&self) -> Result<(), PersistenceError> {
        self.remove_optional(CART_ID_FILE)
    }

    fn load_identity(&self) -> Result<Option<Identity>, PersistenceError> {
        let Some(contents) = self.read_optional(IDENTITY_FILE)? else {
            return Ok(None);
        };
        match serde_json::from_str(&contents) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable identity record");
                Ok(None)
            }
        }
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(identity)?;
        write_atomic(&self.path(IDENTITY_FILE), &json)
    }
}

// =============================================================================
// MemorySnapshotStore
// =============================================================================

/// Snapshot store kept in memory, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    state: Mutex<MemorySnapshot>,
}

#[derive(Debug, Default)]
struct MemorySnapshot {
    items: Option<Vec<CartItem>>,
    cart_id: Option<CartToken>,
    identity: Option<Identity>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemorySnapshot) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_items(&self) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        Ok(self.with_state(|s| s.items.clone()))
    }

    fn save_items(&self, items: &[CartItem]) -> Result<(), PersistenceError> {
        self.with_state(|s| s.items = Some(items.to_vec()));
        Ok(())
    }

    fn load_cart_id(&self) -> Result<Option<CartToken>, PersistenceError> {
        Ok(self.with_state(|s| s.cart_id.clone()))
    }

    fn save_cart_id(&self, cart_id: &CartToken) -> Result<(), PersistenceError> {
        self.with_state(|s| s.cart_id = Some(cart_id.clone()));
        Ok(())
    }

    fn clear_cart_id(&self) -> Result<(), PersistenceError> {
        self.with_state(|s| s.cart_id = None);
        Ok(())
    }

    fn load_identity(&self) -> Result<Option<Identity>, PersistenceError> {
        Ok(self.with_state(|s| s.identity.clone()))
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), PersistenceError> {
        self.with_state(|s| s.identity = Some(identity.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn items() -> Vec<CartItem> {
        vec![CartItem::new("p1", "Tee", Decimal::new(1500, 2)).with_quantity(2)]
    }

    #[test]
    fn test_file_store_round_trips_items_and_cart_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();

        assert!(store.load_items().unwrap().is_none());
        store.save_items(&items()).unwrap();
        store.save_cart_id(&CartToken::new("tok-1")).unwrap();

        let reopened = FileSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_items().unwrap(), Some(items()));
        assert_eq!(reopened.load_cart_id().unwrap(), Some(CartToken::new("tok-1")));

        reopened.clear_cart_id().unwrap();
        reopened.clear_cart_id().unwrap();
        assert!(reopened.load_cart_id().unwrap().is_none());
    }

    #[test]
    fn test_file_store_snapshot_excludes_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store.save_items(&items()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(ITEMS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], SNAPSHOT_VERSION);
        assert!(value.get("subtotal").is_none());
        assert!(value.get("itemCount").is_none());
    }

    #[test]
    fn test_file_store_discards_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ITEMS_FILE),
            r#"{"version": 0, "items": [{"legacy": true}]}"#,
        )
        .unwrap();

        let store = FileSnapshotStore::open(dir.path()).unwrap();
        assert!(store.load_items().unwrap().is_none());
    }

    #[test]
    fn test_file_store_discards_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ITEMS_FILE), "not json").unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "{").unwrap();

        let store = FileSnapshotStore::open(dir.path()).unwrap();
        assert!(store.load_items().unwrap().is_none());
        assert!(store.load_identity().unwrap().is_none());
    }

    #[test]
    fn test_file_store_ignores_blank_cart_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CART_ID_FILE), "  \n").unwrap();

        let store = FileSnapshotStore::open(dir.path()).unwrap();
        assert!(store.load_cart_id().unwrap().is_none());
    }

    #[test]
    fn test_file_store_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store.save_identity(&Identity::user("u1")).unwrap();
        assert_eq!(store.load_identity().unwrap(), Some(Identity::user("u1")));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        store.save_items(&items()).unwrap();
        store.save_cart_id(&CartToken::new("t")).unwrap();
        store.clear_cart_id().unwrap();

        assert_eq!(store.load_items().unwrap(), Some(items()));
        assert!(store.load_cart_id().unwrap().is_none());
    }
}
