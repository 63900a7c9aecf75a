//! # broadcast-rpc
//!
//! Request/response RPC semantics on top of a broadcast-only
//! publish/subscribe channel.
//!
//! Multiple independent peers share one logical channel. Any peer may publish
//! a request, any subset of peers may handle it, and the requester correlates
//! the first reply with its originating request via a per-call nonce.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Peer                                                    │
//! │                                                         │
//! │  dispatch loop ──┬─▶ CallTracker    (nonce → slot)      │
//! │       ▲          └─▶ HandlerRegistry (op → handler)     │
//! │       │                          │                      │
//! │       │                          ▼ spawned tasks        │
//! ├───────┴──────────────────────────┬──────────────────────┤
//! │ BroadcastTransport               ▼                      │
//! │  publish / subscribe / unsubscribe   (loopback fan-out) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport is an external collaborator: anything that fans a published
//! message out to every subscriber of a named channel (the publisher
//! included) will do. [`MemoryBroadcast`] ships for tests and single-process
//! use.
//!
//! ## Quick start
//!
//! ```ignore
//! use broadcast_rpc::{MemoryBroadcast, Payload, Peer};
//!
//! let hub = MemoryBroadcast::new();
//!
//! let server = Peer::new(hub.handle());
//! server.add_handler("echo", |payload| async move { Ok(payload) });
//! server.start().await?;
//!
//! let client = Peer::new(hub.handle());
//! client.start().await?;
//! let reply = client.call("echo", Payload::new()).await?;
//! ```
//!
//! ## Semantics
//!
//! - First reply wins: later replies for an already-resolved nonce are
//!   silently dropped.
//! - A peer serves its own requests, but never resolves its own pending call
//!   from its own echoed reply.
//! - Handler failures never reach the remote caller; it observes a
//!   [`IpcError::CallTimeout`] instead.
//! - No delivery, ordering, or exactly-once guarantees beyond what the
//!   transport provides.

#![deny(missing_docs)]

pub mod calls;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod peer;
pub mod transport;

pub use calls::CallTracker;
pub use envelope::{Envelope, EnvelopeKind, Payload};
pub use error::{BoxError, CodecError, HandlerError, IpcError, TransportError};
pub use handlers::{HandlerRegistry, HandlerResult};
pub use identity::Identity;
pub use peer::{ErrorHook, Peer, PeerConfig};
pub use transport::{
    BroadcastTransport, MemoryBroadcast, MessageKind, Subscription, TransportMessage,
};
