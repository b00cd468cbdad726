//! Shared types used by every layer of the fulfillment core.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{AddressId, CartLineId, OrderId, ProductId, UserId, Version};
