//! The order state machine as a single transition table.
//!
//! Every status change goes through [`transition`]. A `(status, action)` pair
//! that has no row in [`TRANSITIONS`] is rejected the same way regardless of
//! which operation asked for it.

use serde::{Deserialize, Serialize};

use super::{OrderStatus, PaymentStatus};

/// Something a caller asks an order to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Pay,
    Ship,
    Confirm,
    Cancel,
    Timeout,
}

impl OrderAction {
    /// Who is allowed to request this action.
    pub fn party(&self) -> Party {
        match self {
            OrderAction::Pay | OrderAction::Confirm | OrderAction::Cancel => Party::Buyer,
            OrderAction::Ship => Party::Seller,
            OrderAction::Timeout => Party::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Pay => "pay",
            OrderAction::Ship => "ship",
            OrderAction::Confirm => "confirm",
            OrderAction::Cancel => "cancel",
            OrderAction::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The party an action must come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Buyer,
    Seller,
    /// Internal timers; no caller identity is checked.
    System,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Party::Buyer => "buyer",
            Party::Seller => "seller",
            Party::System => "system",
        };
        f.write_str(name)
    }
}

/// Side effects the caller must carry out in the same unit of work as the
/// status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Return every item's quantity to the stock ledger.
    ReleaseStock,
    /// Drop the pending timeout cancellation for this order.
    RemoveTimeoutTask,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub action: OrderAction,
    pub to: OrderStatus,
    /// New payment status, if the transition changes it.
    pub payment: Option<PaymentStatus>,
    pub effects: &'static [Effect],
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: OrderStatus::PendingPayment,
        action: OrderAction::Pay,
        to: OrderStatus::PendingShipment,
        payment: Some(PaymentStatus::Paid),
        effects: &[Effect::RemoveTimeoutTask],
    },
    Transition {
        from: OrderStatus::PendingShipment,
        action: OrderAction::Ship,
        to: OrderStatus::Shipped,
        payment: None,
        effects: &[],
    },
    Transition {
        from: OrderStatus::Shipped,
        action: OrderAction::Confirm,
        to: OrderStatus::Completed,
        payment: None,
        effects: &[],
    },
    Transition {
        from: OrderStatus::PendingPayment,
        action: OrderAction::Cancel,
        to: OrderStatus::Cancelled,
        payment: None,
        effects: &[Effect::ReleaseStock, Effect::RemoveTimeoutTask],
    },
    Transition {
        from: OrderStatus::PendingPayment,
        action: OrderAction::Timeout,
        to: OrderStatus::Cancelled,
        payment: None,
        effects: &[Effect::ReleaseStock],
    },
];

/// Looks up the row for `(from, action)`.
pub fn transition(from: OrderStatus, action: OrderAction) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.action == action)
}
