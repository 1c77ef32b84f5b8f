//! Durable notification queue tables
//!
//! Fallback deliveries for recipients that were offline when a push was
//! attempted. Entries are retried by the notification worker and moved to the
//! dead-letter table once the retry budget is spent.

use super::{
    MarketStorage, NOTIFICATION_DEAD_LETTER_TABLE, NOTIFICATION_QUEUE_TABLE, StorageResult,
};
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use shared::message::PushMessage;

/// Queued delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: String,
    pub message: PushMessage,
    pub created_at: i64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last delivery attempt (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
}

impl NotificationTask {
    pub fn new(message: PushMessage, created_at: i64) -> Self {
        Self {
            id: message.message_id.to_string(),
            message,
            created_at,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.message.recipient_id
    }
}

/// Exhausted delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task: NotificationTask,
    pub failed_at: i64,
    pub last_error: String,
}

impl MarketStorage {
    /// Append a task to the queue
    pub fn enqueue_notification(&self, task: &NotificationTask) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(NOTIFICATION_QUEUE_TABLE)?;
            let value = serde_json::to_vec(task)?;
            table.insert(task.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All queued tasks, oldest first
    pub fn pending_notifications(&self) -> StorageResult<Vec<NotificationTask>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NOTIFICATION_QUEUE_TABLE)?;

        let mut tasks = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            tasks.push(serde_json::from_slice::<NotificationTask>(value.value())?);
        }
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    pub fn pending_notification_count(&self) -> StorageResult<usize> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NOTIFICATION_QUEUE_TABLE)?;
        Ok(table.len()? as usize)
    }

    /// Queued tasks addressed to one recipient, oldest first
    pub fn pending_notifications_for(&self, recipient_id: &str) -> StorageResult<Vec<NotificationTask>> {
        Ok(self
            .pending_notifications()?
            .into_iter()
            .filter(|t| t.recipient_id() == recipient_id)
            .collect())
    }

    /// Remove a delivered task
    pub fn remove_notification(&self, task_id: &str) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(NOTIFICATION_QUEUE_TABLE)?;
            table.remove(task_id)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Record a failed attempt, increment retry count
    pub fn mark_notification_failed(&self, task_id: &str, error: &str, now: i64) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(NOTIFICATION_QUEUE_TABLE)?;

            let task_opt = if let Some(value) = table.get(task_id)? {
                let task: NotificationTask = serde_json::from_slice(value.value())?;
                Some(task)
            } else {
                None
            };

            if let Some(mut task) = task_opt {
                task.retry_count += 1;
                task.last_error = Some(error.to_string());
                task.last_attempt_at = Some(now);
                let new_value = serde_json::to_vec(&task)?;
                table.insert(task_id, new_value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Move a task from the queue to the dead-letter table
    pub fn move_notification_to_dead_letter(
        &self,
        task_id: &str,
        error: &str,
        now: i64,
    ) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut queue_table = txn.open_table(NOTIFICATION_QUEUE_TABLE)?;
            let mut dead_letter_table = txn.open_table(NOTIFICATION_DEAD_LETTER_TABLE)?;

            let task_opt = if let Some(value) = queue_table.get(task_id)? {
                let task: NotificationTask = serde_json::from_slice(value.value())?;
                Some(task)
            } else {
                None
            };

            if let Some(task) = task_opt {
                let entry = DeadLetterEntry {
                    task,
                    failed_at: now,
                    last_error: error.to_string(),
                };
                let value = serde_json::to_vec(&entry)?;
                dead_letter_table.insert(task_id, value.as_slice())?;
                queue_table.remove(task_id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All dead-letter entries
    pub fn notification_dead_letters(&self) -> StorageResult<Vec<DeadLetterEntry>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NOTIFICATION_DEAD_LETTER_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice::<DeadLetterEntry>(value.value())?);
        }
        Ok(entries)
    }
}
