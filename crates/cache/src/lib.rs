//! Non-authoritative caches for product and cart reads.
//!
//! This crate provides:
//! - [`CacheBackend`] trait over a key/value cache with TTLs, and an in-memory backend
//! - [`CacheInvalidator`] implementing delete, write, then a delayed second delete
//! - Cache-aside views for product detail and per-buyer carts
//!
//! Cache faults are logged and counted, never returned to callers: the
//! relational rows stay authoritative.

pub mod backend;
pub mod error;
pub mod invalidator;
pub mod keys;
pub mod views;

pub use backend::{CacheBackend, InMemoryCache};
pub use error::{CacheError, Result};
pub use invalidator::{CacheInvalidator, InvalidationGuard};
pub use views::{CartItemView, CartSummary, CartView, ProductDetail, ProductDetailView};
