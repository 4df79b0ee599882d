//! Product catalog.
//!
//! Cart lines are priced and described from the catalog, never from what the
//! client sends. The catalog is loaded once at startup from a JSON file, or a
//! small demo catalog is used.
//!
//! ```json
//! { "products": [
//!     { "id": "tee", "slug": "classic-tee", "name": "Classic Tee", "price": "25.00",
//!       "image": "/img/tee.jpg",
//!       "variants": [{ "id": "m", "name": "Medium" }] }
//! ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use cart_sync_core::wire::PushLine;
use cart_sync_core::{CartItem, ProductId, VariantId};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Errors loading a catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A product that can be put in a cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    #[serde(default)]
    pub slug: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub variants: Vec<CatalogVariant>,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVariant {
    pub id: VariantId,
    pub name: String,
    /// Overrides the product price when set.
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Deserialize)]
struct CatalogFile {
    products: Vec<CatalogProduct>,
}

/// Products indexed by ID.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<ProductId, CatalogProduct>,
}

impl Catalog {
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&text)?;
        Ok(Self::new(file.products))
    }

    /// A small catalog for local development.
    #[must_use]
    pub fn demo() -> Self {
        let variant = |id: &str, name: &str| CatalogVariant {
            id: VariantId::new(id),
            name: name.to_string(),
            price: None,
        };
        Self::new([
            CatalogProduct {
                id: ProductId::new("tee"),
                slug: "classic-tee".to_string(),
                name: "Classic Tee".to_string(),
                price: Decimal::new(2500, 2),
                image: "/static/img/tee.jpg".to_string(),
                variants: vec![
                    variant("s", "Small"),
                    variant("m", "Medium"),
                    variant("l", "Large"),
                ],
            },
            CatalogProduct {
                id: ProductId::new("mug"),
                slug: "enamel-mug".to_string(),
                name: "Enamel Mug".to_string(),
                price: Decimal::new(1400, 2),
                image: "/static/img/mug.jpg".to_string(),
                variants: Vec::new(),
            },
            CatalogProduct {
                id: ProductId::new("stickers"),
                slug: "sticker-pack".to_string(),
                name: "Sticker Pack".to_string(),
                price: Decimal::new(500, 2),
                image: "/static/img/stickers.jpg".to_string(),
                variants: Vec::new(),
            },
        ])
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CatalogProduct> {
        self.products.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Build the cart line for a pushed line.
    ///
    /// Returns `None` if the product, or the requested variant, is unknown.
    #[must_use]
    pub fn line(&self, line: &PushLine) -> Option<CartItem> {
        let product = self.products.get(&line.product_id)?;
        let item = CartItem::new(product.id.clone(), product.name.clone(), product.price)
            .with_slug(product.slug.clone())
            .with_image(product.image.clone())
            .with_quantity(line.quantity);

        let Some(variant_id) = &line.variant_id else {
            return Some(item);
        };
        let variant = product.variants.iter().find(|v| &v.id == variant_id)?;
        let mut item = item.with_variant(variant.id.clone(), Some(variant.name.clone()));
        if let Some(price) = variant.price {
            item.price = price;
        }
        Some(item)
    }
}
