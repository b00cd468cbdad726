//! Shipping addresses and the per-order snapshot.

use common::{AddressId, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// An address saved in a buyer's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
}

impl ShippingAddress {
    /// Copies the address into an immutable snapshot owned by `order_id`.
    pub fn snapshot_for(&self, order_id: OrderId) -> OrderAddress {
        OrderAddress {
            order_id,
            recipient_name: self.recipient_name.clone(),
            phone: self.phone.clone(),
            province: self.province.clone(),
            city: self.city.clone(),
            district: self.district.clone(),
            detail: self.detail.clone(),
        }
    }
}

/// The shipping address as it was when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAddress {
    pub order_id: OrderId,
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
}
