use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Order, OrderNumber};
use serde::{Deserialize, Serialize};

/// A pending cancellation check for one order.
///
/// Equality and hashing use the order id only, so removing a task only
/// needs the order it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationTask {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub buyer_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl CancellationTask {
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            buyer_id: order.buyer_id,
            created_at: order.created_at,
        }
    }
}

impl PartialEq for CancellationTask {
    fn eq(&self, other: &Self) -> bool {
        self.order_id == other.order_id
    }
}

impl Eq for CancellationTask {}

impl Hash for CancellationTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_id.hash(state);
    }
}
