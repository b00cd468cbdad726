//! Freight, discount and currency conversion.
//!
//! Both services are plain pass-throughs by default: no freight, no
//! discount, and a rate of exactly 1 between any two currencies.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::{Money, OrderItem};
use rust_decimal::Decimal;

use crate::{FulfillmentError, Result};

/// What the pricing service sees of an order being placed.
#[derive(Debug, Clone, Copy)]
pub struct PricingInput<'a> {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub items: &'a [OrderItem],
    pub product_amount: Money,
}

/// Freight and discount for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quote {
    pub freight: Money,
    pub discount: Money,
}

/// Computes freight and discount for a new order.
#[async_trait]
pub trait PricingService: Send + Sync {
    async fn quote(&self, input: &PricingInput<'_>) -> Result<Quote>;
}

/// Fixed freight and discount for every order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPricing {
    quote: Quote,
}

impl FlatPricing {
    pub fn new(freight: Money, discount: Money) -> Self {
        Self {
            quote: Quote { freight, discount },
        }
    }
}

#[async_trait]
impl PricingService for FlatPricing {
    async fn quote(&self, _input: &PricingInput<'_>) -> Result<Quote> {
        if self.quote.freight.is_negative() || self.quote.discount.is_negative() {
            return Err(FulfillmentError::Validation(
                "freight and discount must not be negative".to_string(),
            ));
        }
        Ok(self.quote)
    }
}

/// Looks up the rate from one currency into another.
#[async_trait]
pub trait ExchangeRateService: Send + Sync {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal>;
}

/// Exchange rates from a fixed table. Pairs missing from the table, and
/// conversions into the same currency, use a rate of 1.
#[derive(Debug, Clone, Default)]
pub struct StaticExchangeRates {
    rates: Arc<RwLock<HashMap<(String, String), Decimal>>>,
}

impl StaticExchangeRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, from: &str, to: &str, rate: Decimal) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
    }
}

#[async_trait]
impl ExchangeRateService for StaticExchangeRates {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal> {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        if from == to {
            return Ok(Decimal::ONE);
        }
        let rate = self
            .rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from, to))
            .copied()
            .unwrap_or(Decimal::ONE);
        if rate <= Decimal::ZERO {
            return Err(FulfillmentError::Validation(format!(
                "exchange rate must be positive, got {rate}"
            )));
        }
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_default_quote_is_free() {
        let input = PricingInput {
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            items: &[],
            product_amount: Money::from_cents(100),
        };
        assert_eq!(FlatPricing::default().quote(&input).await.unwrap(), Quote::default());
    }

    #[tokio::test]
    async fn test_rates_pass_through_unless_configured() {
        let rates = StaticExchangeRates::new();
        assert_eq!(rates.rate("CNY", "USD").await.unwrap(), Decimal::ONE);

        let usd = Decimal::from_str("0.1389").unwrap();
        rates.set_rate("cny", "usd", usd);
        assert_eq!(rates.rate("CNY", "USD").await.unwrap(), usd);
        assert_eq!(rates.rate("CNY", "CNY").await.unwrap(), Decimal::ONE);
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_rejected() {
        let rates = StaticExchangeRates::new();
        rates.set_rate("CNY", "JPY", Decimal::ZERO);
        assert!(matches!(
            rates.rate("CNY", "JPY").await,
            Err(FulfillmentError::Validation(_))
        ));
    }
}
