//! Broadcast transport boundary.
//!
//! The core treats the publish/subscribe primitive as an external
//! collaborator: anything that can fan a published byte message out to every
//! current subscriber of a named channel (the publisher included) can carry
//! broadcast RPC. Connection management, framing, and delivery guarantees all
//! live behind this trait.
//!
//! [`MemoryBroadcast`] is an in-process implementation used by the tests and
//! examples.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub mod memory;

pub use memory::MemoryBroadcast;

/// Discriminates real channel traffic from subscription control frames.
///
/// Pub/sub transports typically confirm subscriptions in-band (Redis, for
/// example, delivers a `subscribe` confirmation on the same stream). The
/// dispatch loop skips everything that is not [`MessageKind::Data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// An application message published to the channel.
    Data,
    /// A transport-level control frame (subscribe/unsubscribe confirmations).
    Control,
}

/// One inbound message from a subscribed channel.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Data or control frame.
    pub kind: MessageKind,
    /// Raw message bytes.
    pub payload: Vec<u8>,
}

impl TransportMessage {
    /// Build a data frame.
    pub fn data(payload: Vec<u8>) -> Self {
        TransportMessage {
            kind: MessageKind::Data,
            payload,
        }
    }

    /// Build a control frame.
    pub fn control(payload: Vec<u8>) -> Self {
        TransportMessage {
            kind: MessageKind::Control,
            payload,
        }
    }
}

/// An active subscription: a stream of inbound [`TransportMessage`]s.
///
/// The stream ends (`recv` returns `None`) when the subscription is torn
/// down or the transport goes away.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<TransportMessage>,
}

impl Subscription {
    /// Wrap a receiver handed out by a transport implementation.
    pub fn new(rx: mpsc::UnboundedReceiver<TransportMessage>) -> Self {
        Subscription { rx }
    }

    /// Receive the next inbound message, suspending until one arrives.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.rx.recv().await
    }
}

/// The publish/subscribe primitive the core is built on.
///
/// Implementations must deliver every published message to every current
/// subscriber of the channel, including the publisher itself; the core's
/// self-filtering depends on that loopback.
#[async_trait]
pub trait BroadcastTransport: Send + Sync + 'static {
    /// Publish raw bytes to every subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to `channel`, returning the inbound message stream.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;

    /// Tear down this handle's subscription to `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;
}
