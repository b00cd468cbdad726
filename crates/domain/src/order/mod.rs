//! Order aggregate and related types.

mod aggregate;
mod state;
mod transitions;
mod value_objects;

pub use aggregate::{Amounts, Applied, Order};
pub use state::{OrderStatus, PaymentStatus};
pub use transitions::{Effect, OrderAction, Party, TRANSITIONS, Transition, transition};
pub use value_objects::{Money, OrderItem, OrderNumber};

use common::OrderId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// No row of the transition table matches the current status and action.
    #[error("Invalid state transition for order {order_id}: cannot {action} from {from}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        action: OrderAction,
    },

    /// The caller is not the party the action requires.
    #[error("Order {order_id} does not belong to the calling {party}")]
    NotOwner { order_id: OrderId, party: Party },

    /// Discount exceeds product amount plus freight.
    #[error("Order total is negative: product {product} + freight {freight} - discount {discount}")]
    NegativeTotal {
        product: Money,
        freight: Money,
        discount: Money,
    },

    /// The converted amount does not fit in minor units.
    #[error("Converted amount overflows at exchange rate {exchange_rate}")]
    ConversionOverflow { exchange_rate: Decimal },
}
