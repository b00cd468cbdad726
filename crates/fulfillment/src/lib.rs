//! Order fulfillment core of the marketplace.
//!
//! This crate provides:
//! - [`StockDecrementer`]: optimistic, version-checked stock decrements with retry
//! - [`OrderService`]: order placement and the guarded order lifecycle
//! - [`CatalogService`] and [`CartService`]: product and cart writes with cache invalidation
//! - Delayed cancellation of unpaid orders through a [`DelayQueue`],
//!   a [`TimeoutConsumer`] and a [`ReconciliationSweep`]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod orders;
pub mod services;
pub mod stock;
pub mod timeout;

pub use cart::{CartLineUpdate, CartService};
pub use catalog::{CatalogService, NewProduct, ProductChanges};
pub use config::{FulfillmentConfig, StockRetryPolicy};
pub use error::{FulfillmentError, Result};
pub use orders::{
    BUYER_CANCEL_REASON, CreateOrder, OrderDetails, OrderService, SelectedItem,
    TIMEOUT_CANCEL_REASON,
};
pub use services::{
    ExchangeRateService, FlatPricing, PricingInput, PricingService, Quote, StaticExchangeRates,
};
pub use stock::StockDecrementer;
pub use timeout::{
    CancellationTask, DelayQueue, InMemoryDelayQueue, PostgresDelayQueue, QueueError,
    ReconciliationSweep, TimeoutConsumer,
};
