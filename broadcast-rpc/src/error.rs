//! Error types for the broadcast RPC core.

use std::time::Duration;
use thiserror::Error;

/// Boxed error type returned by handler functions.
///
/// Handlers may fail with any error; the core never inspects it beyond
/// reporting it to the error hook.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the public peer operations.
#[derive(Debug, Error)]
pub enum IpcError {
    /// No matching reply arrived within the call deadline.
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The underlying broadcast transport failed.
    ///
    /// Propagated from the operation that triggered it (`call`, `publish`,
    /// `start`, `close`). The core does not retry.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope encoding or decoding failed.
    ///
    /// Only the outbound (encode) path surfaces this to callers; inbound
    /// decode failures are logged and the message is dropped.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer has been closed and cannot serve further operations.
    #[error("peer is closed")]
    Closed,
}

/// Errors from the external broadcast transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Publishing a message to the channel failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Establishing a subscription failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Tearing down a subscription failed.
    #[error("unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    /// The transport connection is gone.
    #[error("transport connection closed")]
    ConnectionClosed,

    /// Underlying I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the wire envelope codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Envelope serialization failed.
    #[error("envelope encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Envelope deserialization failed (malformed inbound message).
    #[error("envelope decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A registered handler failed while serving a request.
///
/// Never surfaced to the remote caller (who observes a timeout instead);
/// delivered to the peer's error hook, which logs it by default.
#[derive(Debug, Error)]
#[error("handler for operation '{op}' failed: {source}")]
pub struct HandlerError {
    /// The operation name the failing handler was bound to.
    pub op: String,

    /// The error the handler returned.
    #[source]
    pub source: BoxError,
}
