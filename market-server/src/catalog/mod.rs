//! Catalog adapter
//!
//! The product catalog and the courier roster belong to external systems. The
//! engine only consumes them through [`CatalogStore`] and [`CourierDirectory`];
//! the in-memory implementations back tests and seeded deployments.

mod couriers;
mod memory;
mod seed;

pub use couriers::{CourierDirectory, MemoryCourierDirectory};
pub use memory::MemoryCatalog;
pub use seed::{CatalogSeed, load_seed};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{ApprovalStatus, DisplaySnapshot};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Unknown variant {variant} for product {product_id}")]
    UnknownVariant { product_id: String, variant: String },

    #[error("Product {0} requires a variant")]
    VariantRequired(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Seed error: {0}")]
    Seed(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Time-bounded promotional price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub price: Decimal,
    /// Unix millis, inclusive
    pub starts_at: i64,
    /// Unix millis, inclusive
    pub ends_at: i64,
}

impl Promotion {
    pub fn is_live(&self, now: i64) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }
}

/// Per-variant inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantState {
    pub stock: u32,
}

/// Authoritative product state as returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub id: String,
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub display: DisplaySnapshot,
    /// Fallback when no other price is set
    #[serde(default)]
    pub base_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    #[serde(default)]
    pub cashback_per_unit: Decimal,
    pub is_active: bool,
    /// Owning vendor active
    pub vendor_active: bool,
    #[serde(default)]
    pub approval: ApprovalStatus,
    /// Stock for variant-less products
    #[serde(default)]
    pub stock: u32,
    /// Empty = product has no variants
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variants: HashMap<String, VariantState>,
}

impl ProductState {
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Active, vendor active and approved
    pub fn is_sellable(&self) -> bool {
        self.is_active && self.vendor_active && self.approval == ApprovalStatus::Approved
    }

    /// Price in effect at `now`: live promotion, then sale, then regular,
    /// then base cost
    pub fn effective_unit_price(&self, now: i64) -> Decimal {
        if let Some(promo) = &self.promotion
            && promo.is_live(now)
        {
            return promo.price;
        }
        self.sale_price
            .or(self.regular_price)
            .unwrap_or(self.base_cost)
    }

    /// Stock available for a line; checks the variant key against the product
    pub fn available_stock(&self, variant_key: Option<&str>) -> CatalogResult<u32> {
        match (variant_key, self.has_variants()) {
            (None, false) => Ok(self.stock),
            (None, true) => Err(CatalogError::VariantRequired(self.id.clone())),
            (Some(key), _) => self
                .variants
                .get(key)
                .map(|v| v.stock)
                .ok_or_else(|| CatalogError::UnknownVariant {
                    product_id: self.id.clone(),
                    variant: key.to_string(),
                }),
        }
    }
}

/// Debit result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied,
    Insufficient { available: u32 },
}

/// Catalog operations consumed by the engine
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, product_id: &str) -> CatalogResult<Option<ProductState>>;

    /// Compare-and-debit; never leaves stock negative
    async fn debit_inventory(
        &self,
        product_id: &str,
        variant_key: Option<&str>,
        quantity: u32,
    ) -> CatalogResult<DebitOutcome>;

    async fn restock_inventory(
        &self,
        product_id: &str,
        variant_key: Option<&str>,
        quantity: u32,
    ) -> CatalogResult<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn product(id: &str, vendor: &str, price: i64, stock: u32) -> ProductState {
        ProductState {
            id: id.into(),
            vendor_id: vendor.into(),
            category_id: None,
            display: DisplaySnapshot {
                name: format!("Product {}", id),
                thumbnail: None,
            },
            base_cost: Decimal::ZERO,
            regular_price: Some(Decimal::from(price)),
            sale_price: None,
            promotion: None,
            cashback_per_unit: Decimal::ZERO,
            is_active: true,
            vendor_active: true,
            approval: ApprovalStatus::Approved,
            stock,
            variants: HashMap::new(),
        }
    }

    #[test]
    fn test_price_priority() {
        let mut p = product("p-1", "v-1", 100, 1);
        p.base_cost = Decimal::from(40);
        assert_eq!(p.effective_unit_price(0), Decimal::from(100));

        p.sale_price = Some(Decimal::from(90));
        assert_eq!(p.effective_unit_price(0), Decimal::from(90));

        p.promotion = Some(Promotion {
            price: Decimal::from(70),
            starts_at: 1_000,
            ends_at: 2_000,
        });
        assert_eq!(p.effective_unit_price(1_500), Decimal::from(70));
        assert_eq!(p.effective_unit_price(2_001), Decimal::from(90));

        p.sale_price = None;
        p.regular_price = None;
        assert_eq!(p.effective_unit_price(0), Decimal::from(40));
    }

    #[test]
    fn test_variant_stock() {
        let mut p = product("p-1", "v-1", 100, 3);
        assert_eq!(p.available_stock(None).unwrap(), 3);
        assert!(matches!(
            p.available_stock(Some("xl")),
            Err(CatalogError::UnknownVariant { .. })
        ));

        p.variants.insert("xl".into(), VariantState { stock: 2 });
        assert_eq!(p.available_stock(Some("xl")).unwrap(), 2);
        assert!(matches!(
            p.available_stock(None),
            Err(CatalogError::VariantRequired(_))
        ));
    }

    #[test]
    fn test_sellable_flags() {
        let mut p = product("p-1", "v-1", 100, 1);
        assert!(p.is_sellable());
        p.vendor_active = false;
        assert!(!p.is_sellable());
        p.vendor_active = true;
        p.approval = ApprovalStatus::Rejected;
        assert!(!p.is_sellable());
    }
}
