//! Cart commands.
//!
//! Every mutating command flushes before returning so the process can exit
//! without losing the debounced push.

use cart_sync_client::{
    CartApi, CartEngine, ConfigError, PersistenceError, PullOutcome, PushOutcome, SyncError,
};
use cart_sync_core::{CartItem, LineKey, ProductId, VariantId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::render;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("No such line in cart: {0}")]
    UnknownLine(String),
}

/// Product and optional variant naming a cart line.
#[derive(Debug, Clone)]
pub struct LineArgs {
    pub product: ProductId,
    pub variant: Option<VariantId>,
}

impl LineArgs {
    #[must_use]
    pub fn new(product: String, variant: Option<String>) -> Self {
        Self {
            product: ProductId::new(product),
            variant: variant.map(VariantId::new),
        }
    }

    #[must_use]
    pub fn key(&self) -> LineKey {
        match &self.variant {
            Some(variant) => LineKey::variant(self.product.clone(), variant.clone()),
            None => LineKey::product(self.product.clone()),
        }
    }
}

pub fn show<A: CartApi>(engine: &CartEngine<A>) {
    render::print(&render::cart(&engine.cart(), engine.cart_id().as_ref()));
}

/// Add a line. Display fields come from the flags, then from the server's
/// copy of the same line, then fall back to the product ID and a zero price.
pub async fn add<A: CartApi>(
    engine: &CartEngine<A>,
    line: &LineArgs,
    qty: u32,
    name: Option<String>,
    price: Option<Decimal>,
) {
    let key = line.key();
    let known = match engine.server_cart().await {
        Ok(server) => server.items.into_iter().find(|item| item.matches(&key)),
        Err(e) => {
            tracing::debug!(error = %e, "Server cart unavailable for line details");
            None
        }
    };

    let item = build_item(line, qty, name, price, known);
    engine.add_item(item);
    finish(engine).await;
}

fn build_item(
    line: &LineArgs,
    qty: u32,
    name: Option<String>,
    price: Option<Decimal>,
    known: Option<CartItem>,
) -> CartItem {
    let name = name
        .or_else(|| known.as_ref().map(|k| k.name.clone()))
        .unwrap_or_else(|| line.product.to_string());
    let price = price
        .or_else(|| known.as_ref().map(|k| k.price))
        .unwrap_or(Decimal::ZERO);

    let mut item = CartItem::new(line.product.clone(), name, price).with_quantity(qty);
    if let Some(variant) = &line.variant {
        let variant_name = known.as_ref().and_then(|k| k.variant_name.clone());
        item = item.with_variant(variant.clone(), variant_name);
    }
    if let Some(known) = known {
        item = item.with_slug(known.slug).with_image(known.image);
    }
    item
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns `UnknownLine` if the cart has no such line.
pub async fn set_quantity<A: CartApi>(
    engine: &CartEngine<A>,
    line: &LineArgs,
    quantity: i64,
) -> Result<(), CliError> {
    let key = line.key();
    if !engine.update_quantity(&key, quantity) {
        return Err(CliError::UnknownLine(key.line_id()));
    }
    finish(engine).await;
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns `UnknownLine` if the cart has no such line.
pub async fn remove<A: CartApi>(engine: &CartEngine<A>, line: &LineArgs) -> Result<(), CliError> {
    let key = line.key();
    if !engine.remove_item(&key) {
        return Err(CliError::UnknownLine(key.line_id()));
    }
    finish(engine).await;
    Ok(())
}

pub async fn clear<A: CartApi>(engine: &CartEngine<A>) {
    engine.clear();
    finish(engine).await;
}

pub async fn sync<A: CartApi>(engine: &CartEngine<A>) {
    match engine.flush().await {
        None => tracing::info!("Nothing to push"),
        Some(outcome) => report_push(&outcome),
    }
    show(engine);
}

pub async fn reload<A: CartApi>(engine: &CartEngine<A>) {
    let outcome = engine.force_reload().await;
    if outcome == PullOutcome::Failed {
        tracing::warn!("Reload failed; showing local cart");
    }
    show(engine);
}

/// Print the local cart, the server cart, and where they differ.
///
/// # Errors
///
/// Returns error if the server cart cannot be fetched.
pub async fn debug<A: CartApi>(engine: &CartEngine<A>) -> Result<(), CliError> {
    let server = engine.server_cart().await?;
    render::print(&render::status(&engine.status()));
    render::print(&render::comparison(&engine.cart(), &server));
    Ok(())
}

pub async fn discard<A: CartApi>(engine: &CartEngine<A>) {
    if engine.discard().await {
        tracing::info!("Server cart deleted");
    }
    show(engine);
}

/// Flush the pending push, log its outcome, and print the cart.
async fn finish<A: CartApi>(engine: &CartEngine<A>) {
    if let Some(outcome) = engine.flush().await {
        report_push(&outcome);
    }
    show(engine);
}

fn report_push(outcome: &PushOutcome) {
    match outcome {
        PushOutcome::Pushed { cart_id } => tracing::info!(cart_id = %cart_id, "Pushed"),
        PushOutcome::Superseded => tracing::info!("Push superseded by identity change"),
        PushOutcome::Failed => tracing::warn!("Push failed; changes kept locally"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_key_with_and_without_variant() {
        let plain = LineArgs::new("tee".to_string(), None);
        assert_eq!(plain.key().line_id(), "tee");

        let sized = LineArgs::new("tee".to_string(), Some("m".to_string()));
        assert_eq!(sized.key().line_id(), "tee:m");
    }

    #[test]
    fn test_build_item_prefers_flags() {
        let line = LineArgs::new("tee".to_string(), None);
        let known = CartItem::new("tee", "Classic Tee", Decimal::new(2500, 2));
        let item = build_item(
            &line,
            2,
            Some("My Tee".to_string()),
            Some(Decimal::ONE),
            Some(known),
        );
        assert_eq!(item.name, "My Tee");
        assert_eq!(item.price, Decimal::ONE);
        assert_eq!(item.quantity, 2);
    }

    #[test]
    fn test_build_item_uses_server_details() {
        let line = LineArgs::new("tee".to_string(), Some("m".to_string()));
        let known = CartItem::new("tee", "Classic Tee", Decimal::new(2500, 2))
            .with_variant("m", Some("Medium".to_string()))
            .with_slug("classic-tee");
        let item = build_item(&line, 1, None, None, Some(known));
        assert_eq!(item.name, "Classic Tee");
        assert_eq!(item.variant_name.as_deref(), Some("Medium"));
        assert_eq!(item.slug, "classic-tee");
        assert_eq!(item.id, "tee:m");
    }

    #[test]
    fn test_build_item_placeholder() {
        let line = LineArgs::new("mystery".to_string(), None);
        let item = build_item(&line, 1, None, None, None);
        assert_eq!(item.name, "mystery");
        assert_eq!(item.price, Decimal::ZERO);
    }
}
