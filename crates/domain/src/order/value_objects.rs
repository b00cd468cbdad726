//! Value objects for the order domain.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::{OrderId, ProductId, UserId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Money amount in minor currency units (fen, cents) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from whole major units.
    pub fn from_major(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }

    /// Converts into another currency at `rate`, rounding half away from zero
    /// to whole minor units. Returns `None` on overflow.
    pub fn convert(&self, rate: Decimal) -> Option<Money> {
        let converted = (Decimal::from(self.cents) * rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        converted.to_i64().map(Money::from_cents)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents - rhs.cents,
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// One line of an order.
///
/// The unit price is frozen at order time, later product price edits do not
/// touch existing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates an item, computing its subtotal from the frozen unit price.
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            order_id,
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
            subtotal: unit_price.multiply(quantity),
        }
    }
}

const TIMESTAMP_LEN: usize = 14;
const BUYER_LEN: usize = 4;
const SEQUENCE_LEN: usize = 3;
const ORDER_NUMBER_LEN: usize = TIMESTAMP_LEN + BUYER_LEN + SEQUENCE_LEN;

/// Human-facing unique order number.
///
/// Layout: `yyyyMMddHHmmss` + four-digit buyer suffix + three-digit daily sequence,
/// e.g. `20260204123456` `0042` `007`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Builds an order number from its parts. The sequence wraps at 1000.
    pub fn generate(at: DateTime<Utc>, buyer: UserId, sequence: u64) -> Self {
        Self(format!(
            "{}{:04}{:03}",
            at.format("%Y%m%d%H%M%S"),
            buyer.numeric_suffix(),
            sequence % 1000
        ))
    }

    /// Validates the shape of a stored or user-supplied order number.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        if value.len() != ORDER_NUMBER_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::InvalidOrderNumber(value.to_string()));
        }
        let number = Self(value.to_string());
        if number.created_at().is_none() {
            return Err(DomainError::InvalidOrderNumber(value.to_string()));
        }
        Ok(number)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp_part(&self) -> &str {
        &self.0[..TIMESTAMP_LEN]
    }

    pub fn buyer_suffix(&self) -> &str {
        &self.0[TIMESTAMP_LEN..TIMESTAMP_LEN + BUYER_LEN]
    }

    pub fn sequence_part(&self) -> &str {
        &self.0[TIMESTAMP_LEN + BUYER_LEN..]
    }

    /// Creation second encoded in the number.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.timestamp_part(), "%Y%m%d%H%M%S").ok()
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1050);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1300);
        assert_eq!((a - b).cents(), 800);
        assert_eq!(a.multiply(3).cents(), 3150);
        assert_eq!(
            vec![a, b, Money::from_major(1)].into_iter().sum::<Money>(),
            Money::from_cents(1400)
        );
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_money_convert_rounds_half_away_from_zero() {
        let amount = Money::from_cents(1001);
        assert_eq!(amount.convert(Decimal::ONE), Some(amount));
        assert_eq!(
            amount.convert(Decimal::new(5, 1)),
            Some(Money::from_cents(501))
        );
        assert_eq!(
            Money::from_cents(1000).convert(Decimal::new(13825, 5)),
            Some(Money::from_cents(138))
        );
    }

    #[test]
    fn test_order_item_subtotal() {
        let item = OrderItem::new(
            OrderId::new(),
            ProductId::new(),
            "Tea",
            Money::from_cents(1999),
            3,
        );
        assert_eq!(item.subtotal, Money::from_cents(5997));
    }

    #[test]
    fn test_order_number_layout() {
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 12, 34, 56).unwrap();
        let buyer = UserId::from_uuid(Uuid::from_u128(10_042));
        let number = OrderNumber::generate(at, buyer, 7);

        assert_eq!(number.as_str(), "202602041234560042007");
        assert_eq!(number.timestamp_part(), "20260204123456");
        assert_eq!(number.buyer_suffix(), "0042");
        assert_eq!(number.sequence_part(), "007");
        assert_eq!(
            number.created_at(),
            Some(at.naive_utc()),
        );
    }

    #[test]
    fn test_order_number_sequence_wraps() {
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 0, 0, 0).unwrap();
        let number = OrderNumber::generate(at, UserId::from_uuid(Uuid::nil()), 1_001);
        assert_eq!(number.sequence_part(), "001");
    }

    #[test]
    fn test_order_number_parse_rejects_bad_shapes() {
        assert!(OrderNumber::parse("202602041234560042007").is_ok());
        assert!(OrderNumber::parse("2026020412345600420").is_err());
        assert!(OrderNumber::parse("20260204123456004200x").is_err());
        assert!(OrderNumber::parse("202613041234560042007").is_err());
    }
}
