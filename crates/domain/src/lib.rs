//! Domain model of the marketplace fulfillment core.
//!
//! This crate is free of I/O. It provides:
//! - Products with their `(stock, version)` ledger row and listing status
//! - Orders, their items and address snapshot
//! - The order state machine as an explicit transition table
//! - Order number formatting and parsing

pub mod address;
pub mod cart;
pub mod error;
pub mod order;
pub mod product;

pub use address::{OrderAddress, ShippingAddress};
pub use cart::CartLine;
pub use error::DomainError;
pub use order::{
    Amounts, Applied, Effect, Money, Order, OrderAction, OrderError, OrderItem, OrderNumber,
    OrderStatus, Party, PaymentStatus, TRANSITIONS, Transition,
};
pub use product::{Product, ProductStatus, StockLevel};
