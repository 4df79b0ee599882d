//! In-process model of the `/cart` endpoint for tests.
//!
//! Follows the same contract as the storefront server: anonymous carts keyed by
//! minted tokens, account carts keyed by user, full-state pushes. Requests can
//! be made to fail or be held in flight behind a gate so tests can interleave
//! them with local mutations and identity changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cart_sync_core::wire::{CartResponse, PushRequest};
use cart_sync_core::{CartItem, CartToken, ProductId, UserId};
use rust_decimal::Decimal;
use tokio::sync::watch;

use super::{CartApi, CartScope};
use crate::error::SyncError;

/// In-memory cart endpoint.
#[derive(Clone, Default)]
pub struct InMemoryCartApi {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    state: Mutex<ServerState>,
    push_gate: Gate,
    fetch_gate: Gate,
    pushes_started: AtomicUsize,
    fetches_started: AtomicUsize,
}

#[derive(Default)]
struct ServerState {
    guests: HashMap<CartToken, Vec<CartItem>>,
    accounts: HashMap<UserId, (CartToken, Vec<CartItem>)>,
    catalog: HashMap<ProductId, CartItem>,
    minted: u64,
    pushes: Vec<(CartScope, PushRequest)>,
    deletes: Vec<CartScope>,
    fail_pushes: usize,
    fail_fetches: usize,
}

impl ServerState {
    fn mint(&mut self) -> CartToken {
        self.minted += 1;
        CartToken::new(format!("cart-{}", self.minted))
    }

    /// Resolve the cart a request addresses, minting one if needed.
    fn resolve(&mut self, scope: &CartScope, guest_token: Option<&CartToken>) -> CartToken {
        match scope {
            CartScope::Account(user_id) => {
                if let Some((token, _)) = self.accounts.get(user_id) {
                    return token.clone();
                }
                let token = self.mint();
                self.accounts
                    .insert(user_id.clone(), (token.clone(), Vec::new()));
                token
            }
            CartScope::Guest(_) => {
                if let Some(token) = guest_token.filter(|t| self.guests.contains_key(*t)) {
                    return token.clone();
                }
                let token = self.mint();
                self.guests.insert(token.clone(), Vec::new());
                token
            }
        }
    }

    fn items_mut(&mut self, scope: &CartScope, token: &CartToken) -> Option<&mut Vec<CartItem>> {
        match scope {
            CartScope::Account(user_id) => self.accounts.get_mut(user_id).map(|(_, items)| items),
            CartScope::Guest(_) => self.guests.get_mut(token),
        }
    }

    fn normalize(&self, request: &PushRequest) -> Vec<CartItem> {
        let mut items: Vec<CartItem> = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let key = line.key();
            let quantity = line.quantity.max(1);
            if let Some(existing) = items.iter_mut().find(|i| i.matches(&key)) {
                existing.quantity = existing.quantity.saturating_add(quantity);
                continue;
            }

            let base = self.catalog.get(&line.product_id).cloned().unwrap_or_else(|| {
                CartItem::new(line.product_id.clone(), line.product_id.as_str(), Decimal::ZERO)
            });
            let item = match &line.variant_id {
                Some(variant) => base.with_variant(variant.clone(), None),
                None => base,
            };
            items.push(item.with_quantity(quantity));
        }
        items
    }
}

/// Blocks requests while held.
struct Gate(watch::Sender<bool>);

impl Default for Gate {
    fn default() -> Self {
        Self(watch::Sender::new(false))
    }
}

impl Gate {
    fn set(&self, held: bool) {
        self.0.send_replace(held);
    }

    async fn pass(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as the gate, so this cannot fail.
        let _ = rx.wait_for(|held| !*held).await;
    }
}

impl InMemoryCartApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catalog product; pushed lines for it take these details.
    #[must_use]
    pub fn with_product(self, item: CartItem) -> Self {
        self.lock().catalog.insert(item.product_id.clone(), item);
        self
    }

    /// Create an anonymous cart with the given items and return its token.
    pub fn seed_guest(&self, items: Vec<CartItem>) -> CartToken {
        let mut state = self.lock();
        let token = state.mint();
        state.guests.insert(token.clone(), items);
        token
    }

    /// Set the account cart of `user_id`.
    pub fn seed_account(&self, user_id: impl Into<UserId>, items: Vec<CartItem>) {
        let mut state = self.lock();
        let user_id = user_id.into();
        let token = match state.accounts.get(&user_id) {
            Some((token, _)) => token.clone(),
            None => state.mint(),
        };
        state.accounts.insert(user_id, (token, items));
    }

    /// Current server items for the cart a scope addresses, if it exists.
    #[must_use]
    pub fn items_for(&self, scope: &CartScope) -> Option<Vec<CartItem>> {
        let state = self.lock();
        match scope {
            CartScope::Account(user_id) => state.accounts.get(user_id).map(|(_, i)| i.clone()),
            CartScope::Guest(token) => token.as_ref().and_then(|t| state.guests.get(t).cloned()),
        }
    }

    /// Every completed push, in arrival order.
    #[must_use]
    pub fn pushes(&self) -> Vec<(CartScope, PushRequest)> {
        self.lock().pushes.clone()
    }

    #[must_use]
    pub fn push_count(&self) -> usize {
        self.lock().pushes.len()
    }

    #[must_use]
    pub fn deletes(&self) -> Vec<CartScope> {
        self.lock().deletes.clone()
    }

    /// Pushes that have been issued, including ones still held at the gate.
    #[must_use]
    pub fn pushes_started(&self) -> usize {
        self.inner.pushes_started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fetches_started(&self) -> usize {
        self.inner.fetches_started.load(Ordering::SeqCst)
    }

    /// Fail the next `n` pushes with a 503.
    pub fn fail_next_pushes(&self, n: usize) {
        self.lock().fail_pushes = n;
    }

    /// Fail the next `n` fetches with a 503.
    pub fn fail_next_fetches(&self, n: usize) {
        self.lock().fail_fetches = n;
    }

    /// Hold pushes before they reach the server state.
    pub fn hold_pushes(&self) {
        self.inner.push_gate.set(true);
    }

    pub fn release_pushes(&self) {
        self.inner.push_gate.set(false);
    }

    /// Hold fetch responses; the server state is read before the hold.
    pub fn hold_fetches(&self) {
        self.inner.fetch_gate.set(true);
    }

    pub fn release_fetches(&self) {
        self.inner.fetch_gate.set(false);
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unavailable() -> SyncError {
    SyncError::Api {
        status: 503,
        message: "injected failure".to_string(),
    }
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    true
}

impl CartApi for InMemoryCartApi {
    async fn fetch(&self, scope: &CartScope) -> Result<CartResponse, SyncError> {
        self.inner.fetches_started.fetch_add(1, Ordering::SeqCst);

        // The server reads the cart before the response is held, so a held
        // fetch returns the state as of when it was issued.
        let response = {
            let mut state = self.lock();
            if take_failure(&mut state.fail_fetches) {
                Err(unavailable())
            } else {
                let cart_id = state.resolve(scope, scope.query_cart_id());
                let items = state
                    .items_mut(scope, &cart_id)
                    .cloned()
                    .unwrap_or_default();
                Ok(CartResponse { cart_id, items })
            }
        };
        self.inner.fetch_gate.pass().await;
        response
    }

    async fn push(
        &self,
        scope: &CartScope,
        request: &PushRequest,
    ) -> Result<CartResponse, SyncError> {
        self.inner.pushes_started.fetch_add(1, Ordering::SeqCst);
        self.inner.push_gate.pass().await;

        let mut state = self.lock();
        if take_failure(&mut state.fail_pushes) {
            return Err(unavailable());
        }
        state.pushes.push((scope.clone(), request.clone()));

        let cart_id = state.resolve(scope, request.cart_id.as_ref());
        let items = state.normalize(request);
        if let Some(slot) = state.items_mut(scope, &cart_id) {
            slot.clone_from(&items);
        }
        Ok(CartResponse { cart_id, items })
    }

    async fn delete(&self, scope: &CartScope) -> Result<(), SyncError> {
        let mut state = self.lock();
        state.deletes.push(scope.clone());
        match scope {
            CartScope::Account(user_id) => {
                if let Some((_, items)) = state.accounts.get_mut(user_id) {
                    items.clear();
                }
            }
            CartScope::Guest(Some(token)) => {
                state.guests.remove(token);
            }
            CartScope::Guest(None) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use cart_sync_core::wire::PushLine;

    use super::*;

    fn line(product: &str, quantity: u32) -> PushLine {
        PushLine {
            product_id: ProductId::new(product),
            variant_id: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_fetch_without_token_mints_empty_cart() {
        let api = InMemoryCartApi::new();
        let first = api.fetch(&CartScope::Guest(None)).await.unwrap();
        let second = api.fetch(&CartScope::Guest(None)).await.unwrap();

        assert!(first.items.is_empty());
        assert_ne!(first.cart_id, second.cart_id);
    }

    #[tokio::test]
    async fn test_push_is_full_state_and_normalized() {
        let api = InMemoryCartApi::new()
            .with_product(CartItem::new("p1", "Tee", Decimal::new(1500, 2)));
        let request = PushRequest {
            cart_id: None,
            items: vec![line("p1", 1), line("p1", 2), line("p2", 0)],
        };

        let first = api.push(&CartScope::Guest(None), &request).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].quantity, 3);
        assert_eq!(first.items[0].name, "Tee");
        assert_eq!(first.items[1].quantity, 1);

        let again = PushRequest {
            cart_id: Some(first.cart_id.clone()),
            ..request
        };
        let scope = CartScope::Guest(Some(first.cart_id.clone()));
        let second = api.push(&scope, &again).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_account_cart_is_stable_per_user() {
        let api = InMemoryCartApi::new();
        let scope = CartScope::Account(UserId::new("alice"));
        let a = api.fetch(&scope).await.unwrap();
        let b = api.fetch(&scope).await.unwrap();
        assert_eq!(a.cart_id, b.cart_id);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let api = InMemoryCartApi::new();
        api.fail_next_fetches(1);
        assert!(api.fetch(&CartScope::Guest(None)).await.is_err());
        assert!(api.fetch(&CartScope::Guest(None)).await.is_ok());
    }
}
