//! End-to-end cart sync tests against the reference server.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use cart_sync_client::{MemorySnapshotStore, PullOutcome, PushOutcome};
use cart_sync_core::{CartItem, Identity, LineKey, ProductId, UserId, VariantId};
use cart_sync_integration_tests::{TEST_DEBOUNCE, TestServer};
use rust_decimal::Decimal;

fn tee_medium(quantity: u32) -> CartItem {
    CartItem::new("tee", "Classic Tee", Decimal::new(2500, 2))
        .with_variant("m", Some("Medium".to_string()))
        .with_quantity(quantity)
}

fn mug() -> CartItem {
    CartItem::new("mug", "Enamel Mug", Decimal::new(1400, 2))
}

fn store() -> Arc<MemorySnapshotStore> {
    Arc::new(MemorySnapshotStore::new())
}

// ============================================================================
// Guest carts
// ============================================================================

#[tokio::test]
async fn test_guest_push_uses_minted_cart_id() {
    let server = TestServer::spawn().await;
    let engine = server.engine(&server.api(), &store());

    assert_eq!(
        engine.bootstrap(&Identity::Anonymous).await,
        PullOutcome::Unchanged
    );
    let minted = engine.cart_id().unwrap();

    engine.add_item(tee_medium(2));
    let outcome = engine.flush().await.unwrap();
    assert_eq!(outcome, PushOutcome::Pushed { cart_id: minted });

    let remote = engine.server_cart().await.unwrap();
    assert_eq!(remote.items.len(), 1);
    assert_eq!(remote.items[0].id, "tee:m");
    assert_eq!(remote.items[0].quantity, 2);
}

#[tokio::test]
async fn test_debounced_mutations_reach_server() {
    let server = TestServer::spawn().await;
    let engine = server.engine(&server.api(), &store());
    engine.bootstrap(&Identity::Anonymous).await;

    engine.add_item(mug());
    engine.add_item(mug());
    engine.add_item(mug());

    let mut quantity = 0;
    for _ in 0..40 {
        tokio::time::sleep(TEST_DEBOUNCE).await;
        let remote = engine.server_cart().await.unwrap();
        quantity = remote.items.first().map_or(0, |item| item.quantity);
        if quantity == 3 {
            break;
        }
    }
    assert_eq!(quantity, 3);
    assert!(!engine.status().pending);
}

#[tokio::test]
async fn test_server_prices_lines_from_catalog() {
    let server = TestServer::spawn().await;
    let engine = server.engine(&server.api(), &store());
    engine.bootstrap(&Identity::Anonymous).await;

    engine.add_item(CartItem::new("mug", "Cheap Mug", Decimal::ONE));
    engine.add_item(CartItem::new("ghost", "Not For Sale", Decimal::ONE));
    engine.flush().await;

    assert_eq!(engine.force_reload().await, PullOutcome::Replaced);
    let cart = engine.cart();
    assert_eq!(cart.items().len(), 1);
    assert_eq!(cart.items()[0].name, "Enamel Mug");
    assert_eq!(cart.subtotal(), Decimal::new(1400, 2));
}

#[tokio::test]
async fn test_removed_line_stays_removed() {
    let server = TestServer::spawn().await;
    let engine = server.engine(&server.api(), &store());
    engine.bootstrap(&Identity::Anonymous).await;

    engine.add_item(tee_medium(1));
    engine.add_item(mug());
    engine.flush().await;

    let key = LineKey::variant(ProductId::new("tee"), VariantId::new("m"));
    assert!(engine.remove_item(&key));
    engine.flush().await;

    engine.force_reload().await;
    let cart = engine.cart();
    assert!(cart.get(&key).is_none());
    assert_eq!(cart.items().len(), 1);
}

#[tokio::test]
async fn test_guest_cart_survives_restart() {
    let server = TestServer::spawn().await;
    let snapshots = store();
    let api = server.api();

    let first = server.engine(&api, &snapshots);
    first.bootstrap(&Identity::Anonymous).await;
    first.add_item(mug());
    first.flush().await;
    let cart_id = first.cart_id();
    drop(first);

    let second = server.engine(&api, &snapshots);
    assert_eq!(
        second.bootstrap(&Identity::Anonymous).await,
        PullOutcome::LocalKept
    );
    assert_eq!(second.cart_id(), cart_id);
    assert_eq!(second.cart().item_count(), 1);
}

#[tokio::test]
async fn test_discard_deletes_server_cart() {
    let server = TestServer::spawn().await;
    let engine = server.engine(&server.api(), &store());
    engine.bootstrap(&Identity::Anonymous).await;

    engine.add_item(mug());
    engine.flush().await;
    let old_id = engine.cart_id().unwrap();

    assert!(engine.discard().await);
    assert!(engine.cart().is_empty());
    assert_eq!(engine.cart_id(), None);

    engine.bootstrap(&Identity::Anonymous).await;
    assert_ne!(engine.cart_id().unwrap(), old_id);
    assert!(engine.server_cart().await.unwrap().items.is_empty());
}

// ============================================================================
// Account carts
// ============================================================================

#[tokio::test]
async fn test_account_cart_follows_user_across_devices() {
    let server = TestServer::spawn().await;
    let alice = UserId::new("alice");

    let laptop_api = server.api();
    laptop_api.dev_login(&alice).await.unwrap();
    let laptop = server.engine(&laptop_api, &store());
    laptop.bootstrap(&Identity::user(alice.clone())).await;
    laptop.add_item(tee_medium(2));
    laptop.flush().await;

    let phone_api = server.api();
    phone_api.dev_login(&alice).await.unwrap();
    let phone = server.engine(&phone_api, &store());
    assert_eq!(
        phone.bootstrap(&Identity::user(alice)).await,
        PullOutcome::Adopted
    );
    assert_eq!(phone.cart().item_count(), 2);
    assert_eq!(phone.cart_id(), laptop.cart_id());
}

#[tokio::test]
async fn test_logout_starts_empty_guest_cart() {
    let server = TestServer::spawn().await;
    let alice = UserId::new("alice");
    let api = server.api();
    api.dev_login(&alice).await.unwrap();

    let engine = server.engine(&api, &store());
    engine.bootstrap(&Identity::user(alice)).await;
    engine.add_item(mug());
    engine.flush().await;
    let account_cart = engine.cart_id();

    api.dev_logout().await.unwrap();
    engine.logout().await;

    assert!(engine.cart().is_empty());
    assert_ne!(engine.cart_id(), account_cart);
    assert!(engine.server_cart().await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_next_user_never_sees_previous_cart() {
    let server = TestServer::spawn().await;
    let snapshots = store();

    let alice_api = server.api();
    alice_api.dev_login(&UserId::new("alice")).await.unwrap();
    let engine = server.engine(&alice_api, &snapshots);
    engine.bootstrap(&Identity::user("alice")).await;
    engine.add_item(mug());
    engine.flush().await;
    drop(engine);

    let bob_api = server.api();
    bob_api.dev_login(&UserId::new("bob")).await.unwrap();
    let engine = server.engine(&bob_api, &snapshots);
    let outcome = engine.bootstrap(&Identity::user("bob")).await;

    assert_eq!(outcome, PullOutcome::Unchanged);
    assert!(engine.cart().is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(engine.server_cart().await.unwrap().items.is_empty());
}
