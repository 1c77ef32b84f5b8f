//! Cart Model
//!
//! One cart per user, created lazily on first mutation. Snapshot fields on a
//! line are advisory caches; the reconciler re-derives price and availability
//! from the catalog whenever fresh numbers are needed.

use super::{CouponRef, DisplaySnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound for a single line quantity
pub const MAX_LINE_QUANTITY: u32 = 9999;

/// Cart line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Stable id for update/remove
    pub line_id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    /// Always >= 1
    pub quantity: u32,
    pub unit_price_snapshot: Decimal,
    pub line_total_snapshot: Decimal,
    pub display: DisplaySnapshot,
    pub added_at: i64,
}

impl CartLine {
    /// Same product and variant
    pub fn same_item(&self, product_id: &str, variant_key: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_key.as_deref() == variant_key
    }
}

/// Per-user cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: String,
    #[serde(default)]
    pub lines: Vec<CartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponRef>,
    /// Bumped on every persisted mutation
    #[serde(default)]
    pub version: u64,
    pub updated_at: i64,
}

impl Cart {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lines: Vec::new(),
            coupon: None,
            version: 0,
            updated_at: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn find_line_mut(&mut self, line_id: &str) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.line_id == line_id)
    }

    /// Drop lines by id; an emptied cart loses its coupon
    pub fn remove_lines(&mut self, line_ids: &[String]) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !line_ids.contains(&l.line_id));
        self.enforce_empty_invariant();
        before - self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.coupon = None;
    }

    /// A cart with zero lines has no coupon
    pub fn enforce_empty_invariant(&mut self) {
        if self.lines.is_empty() {
            self.coupon = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, product: &str, variant: Option<&str>) -> CartLine {
        CartLine {
            line_id: id.into(),
            product_id: product.into(),
            variant_key: variant.map(String::from),
            quantity: 1,
            unit_price_snapshot: Decimal::from(10),
            line_total_snapshot: Decimal::from(10),
            display: DisplaySnapshot::default(),
            added_at: 0,
        }
    }

    #[test]
    fn test_removing_last_line_drops_coupon() {
        let mut cart = Cart::new("u-1");
        cart.lines.push(line("l-1", "p-1", None));
        cart.lines.push(line("l-2", "p-2", Some("xl")));
        cart.coupon = Some(CouponRef {
            coupon_id: "c-1".into(),
            code: "SAVE10".into(),
        });

        assert_eq!(cart.remove_lines(&["l-1".into()]), 1);
        assert!(cart.coupon.is_some());

        assert_eq!(cart.remove_lines(&["l-2".into()]), 1);
        assert!(cart.is_empty());
        assert!(cart.coupon.is_none());
    }

    #[test]
    fn test_same_item_matches_variant() {
        let l = line("l-1", "p-1", Some("xl"));
        assert!(l.same_item("p-1", Some("xl")));
        assert!(!l.same_item("p-1", None));
        assert!(!l.same_item("p-2", Some("xl")));
    }
}
