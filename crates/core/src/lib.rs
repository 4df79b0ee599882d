//! Cart Sync Core - Shared cart types and the pure cart model.
//!
//! This crate provides the types used across all cart-sync components:
//! - `client` - Client-side cart store and server reconciliation engine
//! - `storefront` - Reference server for the `/cart` endpoint contract
//! - `cli` - Command-line driver over the client engine
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no timers. This keeps it lightweight and allows the cart model to
//! be reasoned about (and tested) in isolation.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, cart line items, identities
//! - [`cart`] - The invariant-preserving cart model
//! - [`wire`] - Request/response bodies of the `/cart` endpoint

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;
pub mod wire;

pub use cart::Cart;
pub use types::*;
