//! Relational store for the fulfillment core.
//!
//! The `(stock, version)` pair on each product row and the `version` column
//! on each order row are the only synchronization between concurrent
//! workers: every contended write is a conditional update that reports how
//! many rows it touched.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use store::{NewOrder, Store, StoreTx};
