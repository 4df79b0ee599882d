//! Cart line items and their identity key.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ProductId, VariantId};

/// Identity of a cart line: `(product_id, variant_id)`.
///
/// Two items with equal keys are the same line. A missing variant is a
/// distinct key from every present variant of the same product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    /// Key for a product without a variant.
    #[must_use]
    pub const fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
        }
    }

    /// Key for a specific product variant.
    #[must_use]
    pub const fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id: Some(variant_id),
        }
    }

    /// Stable line identifier derived from the key.
    #[must_use]
    pub fn line_id(&self) -> String {
        match &self.variant_id {
            Some(variant) => format!("{}:{}", self.product_id, variant),
            None => self.product_id.to_string(),
        }
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line_id())
    }
}

/// A single line in the cart.
///
/// `price` is a snapshot taken when the line was added and is never re-fetched
/// by the client. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line identifier.
    pub id: String,
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    /// Product URL handle.
    #[serde(default)]
    pub slug: String,
    pub name: String,
    /// Unit price in the store's base currency.
    pub price: Decimal,
    pub quantity: u32,
    /// Image URL.
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
}

impl CartItem {
    /// Create a single-quantity line for a product without a variant.
    ///
    /// The slug defaults to the product ID; use the `with_*` builders for the
    /// remaining display fields.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, price: Decimal) -> Self {
        let product_id = product_id.into();
        Self {
            id: product_id.to_string(),
            slug: product_id.to_string(),
            product_id,
            variant_id: None,
            name: name.into(),
            price,
            quantity: 1,
            image: String::new(),
            variant_name: None,
        }
    }

    /// Set the variant, updating the line ID to match the new key.
    #[must_use]
    pub fn with_variant(mut self, variant_id: impl Into<VariantId>, name: Option<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self.variant_name = name;
        self.id = self.key().line_id();
        self
    }

    /// Set the quantity (clamped to at least 1).
    #[must_use]
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    #[must_use]
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// The line's identity key.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    /// Whether this line has the given key.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.variant_id == key.variant_id
    }

    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
