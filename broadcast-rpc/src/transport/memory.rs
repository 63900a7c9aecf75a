//! In-process broadcast hub.
//!
//! `MemoryBroadcast` implements [`BroadcastTransport`] over tokio channels so
//! multiple peers in one process can share a logical channel without any
//! external broker. Each peer gets its own handle from [`MemoryBroadcast::handle`];
//! all handles fan out through the same hub, and `unsubscribe` only tears down
//! the calling handle's subscriptions.
//!
//! Mirrors real pub/sub behavior in two ways the core relies on: every
//! publish loops back to the publisher, and a fresh subscription first sees a
//! control frame confirming it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::{BroadcastTransport, Subscription, TransportMessage};

type SubscriberMap = HashMap<String, HashMap<u64, mpsc::UnboundedSender<TransportMessage>>>;

#[derive(Debug, Default)]
struct Hub {
    next_id: AtomicU64,
    channels: Mutex<SubscriberMap>,
}

/// In-memory [`BroadcastTransport`] for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemoryBroadcast {
    hub: Arc<Hub>,
    /// Subscription ids owned by this handle, per channel.
    local: Mutex<HashMap<String, Vec<u64>>>,
}

impl MemoryBroadcast {
    /// Create a fresh hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create another handle onto the same hub.
    ///
    /// Give each peer its own handle so its `unsubscribe` cannot disturb
    /// other peers' subscriptions.
    pub fn handle(&self) -> Self {
        MemoryBroadcast {
            hub: Arc::clone(&self.hub),
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscribers on `channel`, across all handles.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.hub
            .channels
            .lock()
            .expect("hub lock poisoned")
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl BroadcastTransport for MemoryBroadcast {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut channels = self.hub.channels.lock().expect("hub lock poisoned");
        if let Some(subscribers) = channels.get_mut(channel) {
            // Deliver to everyone, dropping subscribers whose receiver is gone.
            subscribers
                .retain(|_, tx| tx.send(TransportMessage::data(payload.clone())).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);

        // Subscription confirmation, delivered in-band like Redis does.
        tx.send(TransportMessage::control(b"subscribe".to_vec()))
            .map_err(|_| TransportError::SubscribeFailed("receiver dropped".to_string()))?;

        self.hub
            .channels
            .lock()
            .expect("hub lock poisoned")
            .entry(channel.to_string())
            .or_default()
            .insert(id, tx);
        self.local
            .lock()
            .expect("handle lock poisoned")
            .entry(channel.to_string())
            .or_default()
            .push(id);

        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let ids = self
            .local
            .lock()
            .expect("handle lock poisoned")
            .remove(channel)
            .unwrap_or_default();

        let mut channels = self.hub.channels.lock().expect("hub lock poisoned");
        if let Some(subscribers) = channels.get_mut(channel) {
            for id in ids {
                subscribers.remove(&id);
            }
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageKind;

    #[tokio::test]
    async fn test_subscribe_receives_control_frame_first() {
        let hub = MemoryBroadcast::new();
        let mut sub = hub.subscribe("ipc:1").await.unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first.kind, MessageKind::Control);
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_including_publisher() {
        let hub = MemoryBroadcast::new();
        let other = hub.handle();

        let mut sub_a = hub.subscribe("ipc:1").await.unwrap();
        let mut sub_b = other.subscribe("ipc:1").await.unwrap();
        // Skip subscription confirmations.
        sub_a.recv().await.unwrap();
        sub_b.recv().await.unwrap();

        hub.publish("ipc:1", b"hello".to_vec()).await.unwrap();

        for sub in [&mut sub_a, &mut sub_b] {
            let msg = sub.recv().await.unwrap();
            assert_eq!(msg.kind, MessageKind::Data);
            assert_eq!(msg.payload, b"hello");
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_only_affects_own_handle() {
        let hub = MemoryBroadcast::new();
        let a = hub.handle();
        let b = hub.handle();

        let _sub_a = a.subscribe("ipc:1").await.unwrap();
        let mut sub_b = b.subscribe("ipc:1").await.unwrap();
        sub_b.recv().await.unwrap();

        assert_eq!(hub.subscriber_count("ipc:1"), 2);
        a.unsubscribe("ipc:1").await.unwrap();
        assert_eq!(hub.subscriber_count("ipc:1"), 1);

        // b still receives traffic.
        b.publish("ipc:1", b"still here".to_vec()).await.unwrap();
        let msg = sub_b.recv().await.unwrap();
        assert_eq!(msg.payload, b"still here");
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_the_stream() {
        let hub = MemoryBroadcast::new();
        let mut sub = hub.subscribe("ipc:1").await.unwrap();
        sub.recv().await.unwrap();

        hub.unsubscribe("ipc:1").await.unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_to_channel_without_subscribers_is_ok() {
        let hub = MemoryBroadcast::new();
        hub.publish("nobody-home", b"x".to_vec()).await.unwrap();
    }
}
