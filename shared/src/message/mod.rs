//! 推送消息类型定义
//!
//! 在 market-server 和骑手客户端之间共享，用于实时通道（WebSocket）
//! 以及离线时的持久化通知队列。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payload;
pub use payload::*;

/// 推送消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// 消息 ID，用于客户端去重
    pub message_id: Uuid,
    /// 接收方 ID（骑手/用户/商家）
    pub recipient_id: String,
    pub payload: PushPayload,
    pub created_at: i64,
}

impl PushMessage {
    pub fn new(recipient_id: impl Into<String>, payload: PushPayload) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            payload,
            created_at: crate::util::now_millis(),
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
