//! External collaborators consulted while pricing an order.

mod pricing;

pub use pricing::{
    ExchangeRateService, FlatPricing, PricingInput, PricingService, Quote, StaticExchangeRates,
};
