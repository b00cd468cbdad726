//! Order row and its guarded state changes.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::transitions::{Effect, OrderAction, Party, transition};
use super::{Money, OrderError, OrderNumber, OrderStatus, PaymentStatus};

/// Order aggregate root.
///
/// Rows are never hard-deleted. Every change goes through [`Order::apply`],
/// which returns the next image with the version bumped so the store can
/// write it back with a compare-and-swap on the old version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    pub product_amount: Money,
    pub freight_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,

    /// Currency all amounts above are expressed in.
    pub currency: String,
    /// Currency the buyer asked to see the total in, if any.
    pub target_currency: Option<String>,
    pub exchange_rate: Decimal,
    pub converted_amount: Money,

    pub remark: Option<String>,
    pub cancel_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub ship_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
    pub cancel_time: Option<DateTime<Utc>>,

    pub version: Version,
}

/// Amount breakdown of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub product: Money,
    pub freight: Money,
    pub discount: Money,
}

impl Amounts {
    /// product + freight - discount.
    pub fn total(&self) -> Money {
        self.product + self.freight - self.discount
    }
}

/// The outcome of an accepted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The row as it must be written back.
    pub order: Order,
    pub effects: &'static [Effect],
}

impl Applied {
    pub fn has_effect(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

impl Order {
    /// Builds a new order in `PendingPayment` / `Unpaid` at version 1.
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        id: OrderId,
        order_number: OrderNumber,
        buyer_id: UserId,
        seller_id: UserId,
        amounts: Amounts,
        currency: impl Into<String>,
        target_currency: Option<String>,
        exchange_rate: Decimal,
        remark: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let total = amounts.total();
        if total.is_negative() {
            return Err(OrderError::NegativeTotal {
                product: amounts.product,
                freight: amounts.freight,
                discount: amounts.discount,
            });
        }
        let converted_amount = total
            .convert(exchange_rate)
            .ok_or(OrderError::ConversionOverflow { exchange_rate })?;

        Ok(Self {
            id,
            order_number,
            buyer_id,
            seller_id,
            status: OrderStatus::PendingPayment,
            payment_status: PaymentStatus::Unpaid,
            product_amount: amounts.product,
            freight_amount: amounts.freight,
            discount_amount: amounts.discount,
            total_amount: total,
            currency: currency.into(),
            target_currency,
            exchange_rate,
            converted_amount,
            remark,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            payment_time: None,
            ship_time: None,
            complete_time: None,
            cancel_time: None,
            version: Version::first(),
        })
    }

    /// Checks that `caller` may request `action` on this order.
    ///
    /// `System` actions take no caller identity.
    pub fn authorize(&self, action: OrderAction, caller: Option<UserId>) -> Result<(), OrderError> {
        let owner = match action.party() {
            Party::Buyer => self.buyer_id,
            Party::Seller => self.seller_id,
            Party::System => return Ok(()),
        };
        if caller == Some(owner) {
            Ok(())
        } else {
            Err(OrderError::NotOwner {
                order_id: self.id,
                party: action.party(),
            })
        }
    }

    /// Applies `action` at `at`, returning the next row image.
    ///
    /// `reason` is recorded for cancellations and ignored otherwise.
    pub fn apply(
        &self,
        action: OrderAction,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<Applied, OrderError> {
        let row = transition(self.status, action).ok_or(OrderError::InvalidTransition {
            order_id: self.id,
            from: self.status,
            action,
        })?;

        let mut next = self.clone();
        next.status = row.to;
        if let Some(payment) = row.payment {
            next.payment_status = payment;
        }
        match action {
            OrderAction::Pay => next.payment_time = Some(at),
            OrderAction::Ship => next.ship_time = Some(at),
            OrderAction::Confirm => next.complete_time = Some(at),
            OrderAction::Cancel | OrderAction::Timeout => {
                next.cancel_time = Some(at);
                next.cancel_reason = reason.map(str::to_string);
            }
        }
        next.updated_at = at;
        next.version = self.version.next();

        Ok(Applied {
            order: next,
            effects: row.effects,
        })
    }

    /// True once the order has been unpaid for at least `timeout`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.status == OrderStatus::PendingPayment && self.created_at + timeout <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order() -> Order {
        let buyer = UserId::new();
        let now = Utc::now();
        Order::place(
            OrderId::new(),
            OrderNumber::generate(now, buyer, 1),
            buyer,
            UserId::new(),
            Amounts {
                product: Money::from_cents(5000),
                freight: Money::from_cents(800),
                discount: Money::from_cents(300),
            },
            "CNY",
            None,
            Decimal::ONE,
            None,
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_place_starts_pending_payment() {
        let order = order();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.total_amount, Money::from_cents(5500));
        assert_eq!(order.converted_amount, order.total_amount);
        assert_eq!(order.version, Version::first());
    }

    #[test]
    fn test_place_rejects_discount_larger_than_amount() {
        let result = Order::place(
            OrderId::new(),
            OrderNumber::generate(Utc::now(), UserId::new(), 1),
            UserId::new(),
            UserId::new(),
            Amounts {
                product: Money::from_cents(100),
                freight: Money::zero(),
                discount: Money::from_cents(101),
            },
            "CNY",
            None,
            Decimal::ONE,
            None,
            Utc::now(),
        );
        assert!(matches!(result, Err(OrderError::NegativeTotal { .. })));
    }

    #[test]
    fn test_pay_records_payment() {
        let order = order();
        let at = order.created_at + Duration::minutes(3);
        let applied = order.apply(OrderAction::Pay, at, None).unwrap();

        assert_eq!(applied.order.status, OrderStatus::PendingShipment);
        assert_eq!(applied.order.payment_status, PaymentStatus::Paid);
        assert_eq!(applied.order.payment_time, Some(at));
        assert_eq!(applied.order.version, order.version.next());
        assert!(applied.has_effect(Effect::RemoveTimeoutTask));
        assert!(!applied.has_effect(Effect::ReleaseStock));
    }

    #[test]
    fn test_full_lifecycle() {
        let order = order();
        let now = Utc::now();
        let paid = order.apply(OrderAction::Pay, now, None).unwrap().order;
        let shipped = paid.apply(OrderAction::Ship, now, None).unwrap().order;
        let done = shipped.apply(OrderAction::Confirm, now, None).unwrap().order;

        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.version, Version::new(4));
        assert!(done.ship_time.is_some());
        assert!(done.complete_time.is_some());
    }

    #[test]
    fn test_timeout_records_reason() {
        let order = order();
        let applied = order
            .apply(OrderAction::Timeout, Utc::now(), Some("timed out unpaid"))
            .unwrap();
        assert_eq!(applied.order.status, OrderStatus::Cancelled);
        assert_eq!(
            applied.order.cancel_reason.as_deref(),
            Some("timed out unpaid")
        );
        assert!(applied.has_effect(Effect::ReleaseStock));
    }

    #[test]
    fn test_cannot_pay_cancelled_order() {
        let cancelled = order()
            .apply(OrderAction::Cancel, Utc::now(), None)
            .unwrap()
            .order;
        let err = cancelled
            .apply(OrderAction::Pay, Utc::now(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                action: OrderAction::Pay,
                ..
            }
        ));
    }

    #[test]
    fn test_authorize_checks_the_right_party() {
        let order = order();
        assert!(order.authorize(OrderAction::Pay, Some(order.buyer_id)).is_ok());
        assert!(order.authorize(OrderAction::Pay, Some(order.seller_id)).is_err());
        assert!(order.authorize(OrderAction::Ship, Some(order.seller_id)).is_ok());
        assert!(order.authorize(OrderAction::Ship, Some(order.buyer_id)).is_err());
        assert!(order.authorize(OrderAction::Cancel, None).is_err());
        assert!(order.authorize(OrderAction::Timeout, None).is_ok());
    }

    #[test]
    fn test_is_expired() {
        let order = order();
        let timeout = Duration::minutes(15);
        assert!(!order.is_expired(order.created_at + Duration::minutes(14), timeout));
        assert!(order.is_expired(order.created_at + Duration::minutes(15), timeout));

        let paid = order
            .apply(OrderAction::Pay, order.created_at, None)
            .unwrap()
            .order;
        assert!(!paid.is_expired(order.created_at + Duration::hours(1), timeout));
    }
}
