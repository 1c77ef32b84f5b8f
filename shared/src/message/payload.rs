use crate::order::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferCloseReason {
    /// 已被其他骑手接单
    TakenByOther,
    /// 超时
    Expired,
    /// 订单已取消
    OrderCancelled,
}

/// 推送负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushPayload {
    /// 新的配送邀请
    AssignmentOffered {
        order_id: String,
        order_number: String,
        vendor_ids: Vec<String>,
        total: Decimal,
        offered_at: i64,
    },
    /// 邀请失效
    OfferClosed {
        order_id: String,
        reason: OfferCloseReason,
    },
    /// 订单状态变更
    OrderStatusChanged {
        order_id: String,
        order_number: String,
        status: OrderStatus,
    },
}

impl PushPayload {
    pub fn order_id(&self) -> &str {
        match self {
            Self::AssignmentOffered { order_id, .. }
            | Self::OfferClosed { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. } => order_id,
        }
    }
}
