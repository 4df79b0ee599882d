//! Plain-text output.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use cart_sync_client::SyncStatus;
use cart_sync_core::wire::CartResponse;
use cart_sync_core::{Cart, CartItem, CartToken, CurrencyCode, Price};
use rust_decimal::Decimal;

/// Write command output to stdout.
#[allow(clippy::print_stdout)]
pub fn print(text: &str) {
    print!("{text}");
}

/// Amounts are in the store's base currency.
fn money(amount: Decimal) -> String {
    Price::new(amount, CurrencyCode::default()).display()
}

fn line_label(item: &CartItem) -> String {
    match &item.variant_name {
        Some(variant) => format!("{} ({variant})", item.name),
        None => item.name.clone(),
    }
}

/// Cart listing with subtotal.
#[must_use]
pub fn cart(cart: &Cart, cart_id: Option<&CartToken>) -> String {
    let mut out = String::new();
    let id = cart_id.map_or("(none)", CartToken::as_str);
    let _ = writeln!(out, "Cart {id}");

    if cart.is_empty() {
        let _ = writeln!(out, "  (empty)");
    }
    for item in cart.items() {
        let _ = writeln!(
            out,
            "  {:>3} x {:<30} {:<16} {:>10} {:>10}",
            item.quantity,
            line_label(item),
            item.id,
            money(item.price),
            money(item.line_total())
        );
    }
    let _ = writeln!(
        out,
        "Subtotal: {} ({} items)",
        money(cart.subtotal()),
        cart.item_count()
    );
    out
}

#[must_use]
pub fn status(status: &SyncStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "identity:  {}", status.identity);
    let _ = writeln!(
        out,
        "cart id:   {}",
        status.cart_id.as_ref().map_or("(none)", CartToken::as_str)
    );
    let _ = writeln!(out, "epoch:     {}", status.epoch);
    let _ = writeln!(out, "revision:  {}", status.revision);
    let _ = writeln!(out, "pending:   {}", status.pending);
    let _ = writeln!(out, "in flight: {}", status.in_flight);
    out
}

/// Per-line quantities of the local and server carts. Lines that differ are
/// marked with `*`.
#[must_use]
pub fn comparison(local: &Cart, server: &CartResponse) -> String {
    let mut lines: BTreeMap<&str, (Option<u32>, Option<u32>)> = BTreeMap::new();
    for item in local.items() {
        lines.entry(item.id.as_str()).or_default().0 = Some(item.quantity);
    }
    for item in &server.items {
        lines.entry(item.id.as_str()).or_default().1 = Some(item.quantity);
    }

    let qty = |q: Option<u32>| q.map_or_else(|| "-".to_string(), |q| q.to_string());

    let mut out = String::new();
    let _ = writeln!(out, "server cart id: {}", server.cart_id);
    let _ = writeln!(out, "  {:<16} {:>6} {:>6}", "line", "local", "server");
    for (id, (local_qty, server_qty)) in &lines {
        let marker = if local_qty == server_qty { ' ' } else { '*' };
        let _ = writeln!(
            out,
            "{marker} {id:<16} {:>6} {:>6}",
            qty(*local_qty),
            qty(*server_qty)
        );
    }
    let in_sync = lines.values().all(|(l, s)| l == s);
    let _ = writeln!(out, "{}", if in_sync { "in sync" } else { "out of sync" });
    out
}
