//! Core types for cart synchronization.
//!
//! This module provides type-safe wrappers for the cart's domain concepts.

pub mod id;
pub mod identity;
pub mod item;
pub mod price;

pub use id::*;
pub use identity::Identity;
pub use item::{CartItem, LineKey};
pub use price::{CurrencyCode, Price};
