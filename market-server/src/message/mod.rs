//! 离线通知队列
//!
//! 推送失败（接收方不在线）时，消息写入持久化队列，由
//! [`NotificationWorker`] 在接收方上线或周期扫描时重投。
//!
//! ```text
//! broadcast ──push──▶ PushChannel ──▶ WebSocket
//!     │ NotConnected
//!     ▼
//! NotificationQueue (redb) ──scan──▶ NotificationWorker ──▶ PushChannel
//! ```

pub mod worker;

pub use worker::NotificationWorker;

use crate::storage::{MarketStorage, NotificationTask, StorageError};
use async_trait::async_trait;
use shared::message::PushMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("notification queue unavailable: {0}")]
    Unavailable(String),
}

/// Durable fallback for undelivered pushes
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, message: PushMessage) -> Result<(), QueueError>;
}

/// redb-backed queue
#[derive(Debug, Clone)]
pub struct RedbNotificationQueue {
    storage: MarketStorage,
}

impl RedbNotificationQueue {
    pub fn new(storage: MarketStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl NotificationQueue for RedbNotificationQueue {
    async fn enqueue(&self, message: PushMessage) -> Result<(), QueueError> {
        let task = NotificationTask::new(message, shared::util::now_millis());
        self.storage.enqueue_notification(&task)?;
        tracing::debug!(
            task_id = %task.id,
            recipient_id = %task.recipient_id(),
            "Notification queued for offline recipient"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{OfferCloseReason, PushPayload};

    #[tokio::test]
    async fn test_enqueue_persists_task() {
        let storage = MarketStorage::open_in_memory().unwrap();
        let queue = RedbNotificationQueue::new(storage.clone());
        let message = PushMessage::new(
            "c-1",
            PushPayload::OfferClosed {
                order_id: "o-1".into(),
                reason: OfferCloseReason::TakenByOther,
            },
        );

        queue.enqueue(message.clone()).await.unwrap();

        let pending = storage.pending_notifications_for("c-1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message, message);
        assert_eq!(pending[0].id, message.message_id.to_string());
    }
}
