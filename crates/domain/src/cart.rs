//! Cart lines.

use chrono::{DateTime, Utc};
use common::{CartLineId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// One product in a buyer's cart.
///
/// A buyer has at most one line per product; adding the same product again
/// merges into the existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub buyer_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Whether the line takes part in the next checkout.
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(buyer_id: UserId, product_id: ProductId, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: CartLineId::new(),
            buyer_id,
            product_id,
            quantity,
            selected: true,
            created_at: now,
            updated_at: now,
        }
    }
}
