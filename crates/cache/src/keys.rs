//! Cache key layout.

use common::{ProductId, UserId};

pub fn product(id: ProductId) -> String {
    format!("product:{id}")
}

pub fn cart(buyer: UserId) -> String {
    format!("cart:{buyer}")
}
