//! The cart model: a list of line items plus totals derived from it.
//!
//! Every operation is total. Out-of-range quantities are clamped, unknown keys
//! are ignored, and `subtotal`/`item_count` are recomputed after each change so
//! they can never drift from `items`.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{CartItem, LineKey};

/// A cart and its derived totals.
///
/// Totals are private and only ever recomputed from `items`; there is no way
/// to construct a `Cart` with independently supplied totals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    subtotal: Decimal,
    item_count: u64,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart from untrusted items (a snapshot or a server response).
    ///
    /// Lines sharing a key are merged by summing quantities and zero
    /// quantities are raised to 1, so the result satisfies every invariant.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.merge_line(item);
        }
        cart.recompute();
        cart
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Consume the cart, returning its line items.
    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// `Σ price × quantity` over all lines.
    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    /// `Σ quantity` over all lines.
    #[must_use]
    pub const fn item_count(&self) -> u64 {
        self.item_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the line with the given key.
    #[must_use]
    pub fn get(&self, key: &LineKey) -> Option<&CartItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Add an item, merging into an existing line with the same key.
    ///
    /// The existing line keeps its position and snapshot fields; only its
    /// quantity grows by `item.quantity`.
    pub fn add_item(&mut self, item: CartItem) {
        self.merge_line(item);
        self.recompute();
    }

    /// Set the quantity of a line, clamped to `1..=u32::MAX`.
    ///
    /// Returns `false` if no line has the key.
    pub fn update_quantity(&mut self, key: &LineKey, quantity: i64) -> bool {
        let clamped = u32::try_from(quantity.max(1)).unwrap_or(u32::MAX);
        let Some(line) = self.items.iter_mut().find(|item| item.matches(key)) else {
            return false;
        };
        line.quantity = clamped;
        self.recompute();
        true
    }

    /// Remove the line whose key matches exactly.
    ///
    /// A key without a variant never matches a line that has one.
    /// Returns `false` if nothing was removed.
    pub fn remove_item(&mut self, key: &LineKey) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(key));
        let removed = self.items.len() != before;
        if removed {
            self.recompute();
        }
        removed
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute();
    }

    fn merge_line(&mut self, mut item: CartItem) {
        item.quantity = item.quantity.max(1);
        let key = item.key();
        match self.items.iter_mut().find(|line| line.matches(&key)) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
            }
            None => self.items.push(item),
        }
    }

    fn recompute(&mut self) {
        self.subtotal = self.items.iter().map(CartItem::line_total).sum();
        self.item_count = self.items.iter().map(|item| u64::from(item.quantity)).sum();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn tee(quantity: u32) -> CartItem {
        CartItem::new("p1", "Tee", Decimal::new(1000, 2)).with_quantity(quantity)
    }

    fn assert_totals_consistent(cart: &Cart) {
        let subtotal: Decimal = cart.items().iter().map(CartItem::line_total).sum();
        let count: u64 = cart.items().iter().map(|i| u64::from(i.quantity)).sum();
        assert_eq!(cart.subtotal(), subtotal);
        assert_eq!(cart.item_count(), count);
    }

    #[test]
    fn test_add_item_merges_same_key() {
        let mut cart = Cart::new();
        cart.add_item(tee(1));
        cart.add_item(tee(2));
        cart.add_item(tee(3));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 6);
        assert_eq!(cart.item_count(), 6);
        assert_eq!(cart.subtotal(), Decimal::new(6000, 2));
    }

    #[test]
    fn test_add_item_distinct_variants_are_separate_lines() {
        let mut cart = Cart::new();
        cart.add_item(tee(1));
        cart.add_item(tee(1).with_variant("red", None));
        cart.add_item(tee(1).with_variant("blue", None));
        cart.add_item(tee(1).with_variant("red", None));

        assert_eq!(cart.items().len(), 3);
        let red = cart
            .get(&LineKey::variant("p1".into(), "red".into()))
            .unwrap();
        assert_eq!(red.quantity, 2);
        assert_totals_consistent(&cart);
    }

    #[test]
    fn test_add_item_keeps_first_price_snapshot() {
        let mut cart = Cart::new();
        cart.add_item(tee(1));
        cart.add_item(CartItem::new("p1", "Tee", Decimal::new(9999, 2)));

        assert_eq!(cart.items()[0].price, Decimal::new(1000, 2));
        assert_eq!(cart.subtotal(), Decimal::new(2000, 2));
    }

    #[test]
    fn test_update_quantity_floor_is_one() {
        let key = LineKey::product("p1".into());
        for q in [0, -1, -500, i64::MIN] {
            let mut cart = Cart::new();
            cart.add_item(tee(4));
            assert!(cart.update_quantity(&key, q));
            assert_eq!(cart.items()[0].quantity, 1, "quantity {q} must clamp to 1");
            assert_totals_consistent(&cart);
        }
    }

    #[test]
    fn test_update_quantity_ceiling() {
        let mut cart = Cart::new();
        cart.add_item(tee(1));
        cart.update_quantity(&LineKey::product("p1".into()), i64::MAX);
        assert_eq!(cart.items()[0].quantity, u32::MAX);
    }

    #[test]
    fn test_update_quantity_unknown_key_is_ignored() {
        let mut cart = Cart::new();
        cart.add_item(tee(2));
        assert!(!cart.update_quantity(&LineKey::product("nope".into()), 5));
        assert_eq!(cart.items()[0].quantity, 2);
    }

    #[test]
    fn test_remove_item_is_exact() {
        let mut cart = Cart::new();
        cart.add_item(tee(1).with_variant("red", None));

        // Removing the variant-less line must not touch the red variant.
        assert!(!cart.remove_item(&LineKey::product("p1".into())));
        assert_eq!(cart.items().len(), 1);

        cart.add_item(tee(2));
        assert!(cart.remove_item(&LineKey::product("p1".into())));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].variant_id.as_ref().unwrap().as_str(), "red");
        assert_totals_consistent(&cart);
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.add_item(tee(3));
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Decimal::ZERO);
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_from_items_normalizes() {
        let mut zero = tee(1);
        zero.quantity = 0;
        let cart = Cart::from_items(vec![tee(2), zero, tee(1).with_variant("red", None)]);

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_totals_consistent(&cart);
    }

    #[test]
    fn test_totals_after_mixed_sequence() {
        let mut cart = Cart::new();
        let red = LineKey::variant("p1".into(), "red".into());
        cart.add_item(tee(2));
        cart.add_item(CartItem::new("p2", "Mug", Decimal::new(450, 2)).with_quantity(3));
        cart.add_item(tee(1).with_variant("red", None));
        cart.update_quantity(&red, 7);
        cart.remove_item(&LineKey::product("p2".into()));
        cart.add_item(CartItem::new("p2", "Mug", Decimal::new(450, 2)));

        assert_totals_consistent(&cart);
        assert_eq!(cart.item_count(), 10);
        assert_eq!(cart.subtotal(), Decimal::new(9450, 2));
    }
}
