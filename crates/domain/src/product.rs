//! Products and their stock ledger.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::Money;

/// Listing status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProductStatus {
    /// Published but never listed.
    #[default]
    Draft,
    OnShelf,
    /// Withdrawn by the seller.
    OffShelf,
    /// Listed with no stock left. Flips back to `OnShelf` when stock returns.
    SoldOut,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::OnShelf => "on_shelf",
            ProductStatus::OffShelf => "off_shelf",
            ProductStatus::SoldOut => "sold_out",
        }
    }

    /// Status after the stock level changed to `stock`.
    ///
    /// Only listed products move between `OnShelf` and `SoldOut`; drafts and
    /// withdrawn products keep their status.
    pub fn after_stock_change(self, stock: i64) -> ProductStatus {
        match self {
            ProductStatus::OnShelf if stock == 0 => ProductStatus::SoldOut,
            ProductStatus::SoldOut if stock > 0 => ProductStatus::OnShelf,
            other => other,
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProductStatus::Draft),
            "on_shelf" => Ok(ProductStatus::OnShelf),
            "off_shelf" => Ok(ProductStatus::OffShelf),
            "sold_out" => Ok(ProductStatus::SoldOut),
            other => Err(DomainError::UnknownStatus {
                kind: "product",
                value: other.to_string(),
            }),
        }
    }
}

/// A seller's product together with its authoritative stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub price: Money,
    /// Units available. Never negative.
    pub stock: i64,
    pub status: ProductStatus,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// A freshly published product: draft, version 0.
    pub fn draft(
        seller_id: UserId,
        name: impl Into<String>,
        price: Money,
        stock: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProductId::new(),
            seller_id,
            name: name.into(),
            price,
            stock,
            status: ProductStatus::Draft,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Only products on shelf can be carted or ordered.
    pub fn is_on_shelf(&self) -> bool {
        self.status == ProductStatus::OnShelf
    }

    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            product_id: self.id,
            stock: self.stock,
            version: self.version,
        }
    }
}

/// The `(stock, version)` pair a conditional decrement is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i64,
    pub version: Version,
}

impl StockLevel {
    pub fn covers(&self, quantity: u32) -> bool {
        self.stock >= i64::from(quantity)
    }
}
