//! Notification Worker - 离线通知重投
//!
//! Drains the durable queue through the push channel:
//!
//! - recipient offline: the task stays queued, no retry is spent
//! - transient push error: retry with exponential backoff
//! - retry budget spent or task too old: moved to the dead-letter table
//!
//! Note: redb operations are synchronous; they are short and are called
//! directly from async code.

use crate::courier::{DeliveryStatus, PushChannel};
use crate::storage::{MarketStorage, NotificationTask};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_RETRY_COUNT: u32 = 3;
const RETRY_BASE_DELAY_SECS: u64 = 5;
const RETRY_MAX_DELAY_SECS: u64 = 60;
/// 超过 24 小时仍未送达的通知进入死信
const MAX_TASK_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of one drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub still_offline: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Clone)]
pub struct NotificationWorker {
    storage: MarketStorage,
    channel: Arc<dyn PushChannel>,
}

impl std::fmt::Debug for NotificationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationWorker").finish_non_exhaustive()
    }
}

impl NotificationWorker {
    pub fn new(storage: MarketStorage, channel: Arc<dyn PushChannel>) -> Self {
        Self { storage, channel }
    }

    /// Periodic scan until shutdown
    pub async fn run(self, scan_interval: Duration, shutdown: CancellationToken) {
        tracing::info!(interval_secs = scan_interval.as_secs(), "NotificationWorker started");

        let mut interval = tokio::time::interval(scan_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("NotificationWorker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.drain_pending(shared::util::now_millis()).await;
                    if report != DrainReport::default() {
                        tracing::info!(
                            delivered = report.delivered,
                            still_offline = report.still_offline,
                            failed = report.failed,
                            dead_lettered = report.dead_lettered,
                            "Notification queue scanned"
                        );
                    }
                }
            }
        }
    }

    /// Deliver everything queued, subject to backoff
    pub async fn drain_pending(&self, now: i64) -> DrainReport {
        match self.storage.pending_notifications() {
            Ok(tasks) => self.drain(tasks, now).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read notification queue");
                DrainReport::default()
            }
        }
    }

    /// Deliver a recipient's backlog right after it connects
    pub async fn drain_for(&self, recipient_id: &str, now: i64) -> DrainReport {
        match self.storage.pending_notifications_for(recipient_id) {
            Ok(tasks) => self.drain(tasks, now).await,
            Err(e) => {
                tracing::error!(recipient_id = %recipient_id, error = %e, "Failed to read notification backlog");
                DrainReport::default()
            }
        }
    }

    async fn drain(&self, tasks: Vec<NotificationTask>, now: i64) -> DrainReport {
        let mut report = DrainReport::default();
        for task in tasks {
            if self.should_dead_letter(&task, now) {
                report.dead_lettered += 1;
                continue;
            }
            if !Self::backoff_elapsed(&task, now) {
                continue;
            }
            self.deliver(&task, now, &mut report).await;
        }
        report
    }

    fn should_dead_letter(&self, task: &NotificationTask, now: i64) -> bool {
        let reason = if task.retry_count >= MAX_RETRY_COUNT {
            task.last_error.clone().unwrap_or_else(|| "Unknown error".into())
        } else if now - task.created_at > MAX_TASK_AGE_MS {
            "expired undelivered".to_string()
        } else {
            return false;
        };

        tracing::error!(
            task_id = %task.id,
            recipient_id = %task.recipient_id(),
            retry_count = task.retry_count,
            reason = %reason,
            "Moving notification to dead letter queue"
        );
        if let Err(e) = self.storage.move_notification_to_dead_letter(&task.id, &reason, now) {
            tracing::error!(task_id = %task.id, error = %e, "Failed to dead-letter notification");
        }
        true
    }

    /// Exponential backoff: delay = base * 2^retry_count, capped at max
    fn backoff_elapsed(task: &NotificationTask, now: i64) -> bool {
        let Some(last_attempt) = task.last_attempt_at else {
            return true;
        };
        let delay_secs =
            (RETRY_BASE_DELAY_SECS * 2u64.pow(task.retry_count)).min(RETRY_MAX_DELAY_SECS);
        now >= last_attempt + (delay_secs as i64 * 1000)
    }

    async fn deliver(&self, task: &NotificationTask, now: i64, report: &mut DrainReport) {
        match self.channel.send_to(task.message.clone()).await {
            Ok(DeliveryStatus::Delivered) => {
                report.delivered += 1;
                if let Err(e) = self.storage.remove_notification(&task.id) {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to remove delivered notification");
                }
            }
            Ok(DeliveryStatus::NotConnected) => {
                report.still_offline += 1;
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    task_id = %task.id,
                    recipient_id = %task.recipient_id(),
                    error = %e,
                    "Notification redelivery failed"
                );
                if let Err(e2) = self
                    .storage
                    .mark_notification_failed(&task.id, &e.to_string(), now)
                {
                    tracing::error!(task_id = %task.id, error = %e2, "Failed to record notification failure");
                }
            }
        }
    }
}
