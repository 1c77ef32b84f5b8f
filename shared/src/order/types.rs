//! Shared types for orders

use crate::models::Actor;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Status
// ============================================================================

/// 订单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 待确认
    #[default]
    Pending,
    /// 商家已确认
    Confirmed,
    /// 备货中
    Processing,
    /// 待取货
    Ready,
    /// 配送中
    OutForDelivery,
    /// 已送达
    Delivered,
    /// 已取消
    Cancelled,
    /// 已退款
    Refunded,
}

impl OrderStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Next status on the forward path
    pub fn forward(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Processing),
            Self::Processing => Some(Self::Ready),
            Self::Ready => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled | Self::Refunded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payment
// ============================================================================

/// 支付方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// 货到付款
    CashOnDelivery,
    Card,
    Wallet,
}

impl PaymentMethod {
    /// Settlement happens on delivery, not up front
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::CashOnDelivery)
    }
}

/// 支付状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    /// 等待外部支付确认
    Processing,
    Paid,
    Failed,
    Refunded,
}

/// Payment record embedded in an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<i64>,
}

impl PaymentInfo {
    /// Initial payment state at commit time
    pub fn initial(method: PaymentMethod) -> Self {
        let status = if method.is_deferred() {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Processing
        };
        Self {
            method,
            status,
            settled_at: None,
        }
    }
}

// ============================================================================
// Address & History
// ============================================================================

/// 收货地址
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// One entry of the status history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_ends_at_delivered() {
        let mut status = OrderStatus::Pending;
        let mut path = vec![status];
        while let Some(next) = status.forward() {
            path.push(next);
            status = next;
        }
        assert_eq!(
            path,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Processing,
                OrderStatus::Ready,
                OrderStatus::OutForDelivery,
                OrderStatus::Delivered,
            ]
        );
        assert!(status.is_terminal());
    }

    #[test]
    fn test_initial_payment_status() {
        assert_eq!(
            PaymentInfo::initial(PaymentMethod::CashOnDelivery).status,
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentInfo::initial(PaymentMethod::Card).status,
            PaymentStatus::Processing
        );
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }
}
