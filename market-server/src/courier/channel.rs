//! Real-time push channel
//!
//! [`ConnectionRegistry`] keeps one outbound queue per connected recipient
//! (courier, user or vendor). A WebSocket task owns the receiving half and
//! forwards frames to the socket; everyone else pushes through
//! [`PushChannel::send_to`].

use async_trait::async_trait;
use dashmap::DashMap;
use shared::message::PushMessage;
use thiserror::Error;
use tokio::sync::mpsc;

/// Per-connection outbound buffer
const CONNECTION_BUFFER: usize = 32;

/// Delivery result for a connected or absent recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Handed to the recipient's live connection
    Delivered,
    /// No live connection; the caller decides whether to queue
    NotConnected,
}

/// Transient push failure
#[derive(Debug, Error)]
pub enum PushError {
    #[error("outbound buffer full for {0}")]
    BufferFull(String),
    #[error("push channel unavailable: {0}")]
    Unavailable(String),
}

/// Presence-aware push seam
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send_to(&self, message: PushMessage) -> Result<DeliveryStatus, PushError>;

    fn is_connected(&self, recipient_id: &str) -> bool;
}

/// In-process registry of live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, mpsc::Sender<PushMessage>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous one for the recipient
    pub fn register(&self, recipient_id: &str) -> (mpsc::Sender<PushMessage>, mpsc::Receiver<PushMessage>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        if self
            .connections
            .insert(recipient_id.to_string(), tx.clone())
            .is_some()
        {
            tracing::info!(recipient_id = %recipient_id, "Replaced existing push connection");
        }
        (tx, rx)
    }

    /// Remove the connection if it is still the one registered by `sender`
    pub fn unregister(&self, recipient_id: &str, sender: &mpsc::Sender<PushMessage>) {
        self.connections
            .remove_if(recipient_id, |_, current| current.same_channel(sender));
    }

    /// Whether `sender` is still the registered connection
    pub fn is_current(&self, recipient_id: &str, sender: &mpsc::Sender<PushMessage>) -> bool {
        self.connections
            .get(recipient_id)
            .is_some_and(|current| current.same_channel(sender))
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl PushChannel for ConnectionRegistry {
    async fn send_to(&self, message: PushMessage) -> Result<DeliveryStatus, PushError> {
        let recipient_id = message.recipient_id.clone();
        let Some(sender) = self.connections.get(&recipient_id).map(|s| s.clone()) else {
            return Ok(DeliveryStatus::NotConnected);
        };

        match sender.try_send(message) {
            Ok(()) => Ok(DeliveryStatus::Delivered),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(&recipient_id, &sender);
                Ok(DeliveryStatus::NotConnected)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(PushError::BufferFull(recipient_id)),
        }
    }

    fn is_connected(&self, recipient_id: &str) -> bool {
        self.connections
            .get(recipient_id)
            .is_some_and(|s| !s.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{OfferCloseReason, PushPayload};

    fn closed(recipient: &str) -> PushMessage {
        PushMessage::new(
            recipient,
            PushPayload::OfferClosed {
                order_id: "o-1".into(),
                reason: OfferCloseReason::Expired,
            },
        )
    }

    #[tokio::test]
    async fn test_delivers_to_connected_recipient() {
        let registry = ConnectionRegistry::new();
        let (_tx, mut rx) = registry.register("c-1");

        assert_eq!(
            registry.send_to(closed("c-1")).await.unwrap(),
            DeliveryStatus::Delivered
        );
        assert_eq!(
            registry.send_to(closed("c-2")).await.unwrap(),
            DeliveryStatus::NotConnected
        );
        assert_eq!(rx.recv().await.unwrap().recipient_id, "c-1");
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_offline() {
        let registry = ConnectionRegistry::new();
        let (_tx, rx) = registry.register("c-1");
        drop(rx);

        assert!(!registry.is_connected("c-1"));
        assert_eq!(
            registry.send_to(closed("c-1")).await.unwrap(),
            DeliveryStatus::NotConnected
        );
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_new_connection() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = registry.register("c-1");
        let (new_tx, _new_rx) = registry.register("c-1");
        assert!(!registry.is_current("c-1", &old_tx));
        assert!(registry.is_current("c-1", &new_tx));

        registry.unregister("c-1", &old_tx);
        assert!(registry.is_connected("c-1"));
    }

    #[tokio::test]
    async fn test_full_buffer_is_an_error() {
        let registry = ConnectionRegistry::new();
        let (_tx, _rx) = registry.register("c-1");
        for _ in 0..CONNECTION_BUFFER {
            registry.send_to(closed("c-1")).await.unwrap();
        }
        assert!(matches!(
            registry.send_to(closed("c-1")).await,
            Err(PushError::BufferFull(_))
        ));
    }
}
