//! The peer core: dispatch loop and public call/publish surface.
//!
//! One dispatch-loop task per peer pulls messages off the subscribed channel
//! and routes each one:
//!
//! ```text
//! transport ──▶ dispatch loop ──┬─ reply (op absent, nonce present)
//!                               │    └─ sender != self ──▶ CallTracker::resolve
//!                               └─ request (op present)
//!                                    └─ handler bound ──▶ spawned handler task
//!                                         └─ non-empty result + nonce ──▶ publish reply
//! ```
//!
//! Handler invocations run as independently spawned tasks so a slow handler
//! never blocks reception of the next message. `call` suspends only its own
//! task while racing its oneshot slot against the deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::calls::CallTracker;
use crate::envelope::{Envelope, EnvelopeKind, Payload};
use crate::error::{HandlerError, IpcError, TransportError};
use crate::handlers::{Handler, HandlerRegistry, HandlerResult};
use crate::identity::{random_hex, Identity};
use crate::peer::PeerConfig;
use crate::transport::{BroadcastTransport, MessageKind, Subscription, TransportMessage};

/// Callback invoked when a handler fails. Default: log via `tracing::error!`.
pub type ErrorHook = Arc<dyn Fn(&HandlerError) + Send + Sync>;

/// Lifecycle of the peer's single channel subscription and dispatch loop.
#[derive(Debug)]
enum ChannelState {
    /// Not yet subscribed.
    Idle,
    /// Subscribed (lazily, by `call`/`publish`/`start`) but loop not running.
    Subscribed(Subscription),
    /// Dispatch loop running; holds its join handle for `close`.
    Receiving(JoinHandle<Result<(), TransportError>>),
    /// Closed; not restartable.
    Closed,
}

struct PeerInner {
    transport: Arc<dyn BroadcastTransport>,
    channel: String,
    identity: Identity,
    call_timeout: Duration,
    calls: CallTracker,
    handlers: HandlerRegistry,
    error_hook: std::sync::Mutex<ErrorHook>,
    state: tokio::sync::Mutex<ChannelState>,
    shutdown: CancellationToken,
}

/// One process participating in broadcast RPC on a shared channel.
///
/// Cheap to clone (all clones share the same peer state).
///
/// # Example
///
/// ```rust,ignore
/// let hub = MemoryBroadcast::new();
/// let peer = Peer::new(hub.handle());
/// peer.add_handler("echo", |payload| async move { Ok(payload) });
/// peer.start().await?;
///
/// let reply = peer.call("status", Payload::new()).await?;
/// peer.close().await?;
/// ```
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Peer {
    /// Construct a peer over `transport` with the default configuration
    /// (channel `"ipc:1"`, generated identity, 5 second call timeout).
    pub fn new(transport: impl BroadcastTransport) -> Self {
        Self::with_config(transport, PeerConfig::default())
    }

    /// Construct a peer with an explicit configuration.
    pub fn with_config(transport: impl BroadcastTransport, config: PeerConfig) -> Self {
        let identity = match config.identity {
            Some(id) => Identity::from(id),
            None => Identity::generate(),
        };
        let default_hook: ErrorHook = Arc::new(|err: &HandlerError| {
            tracing::error!(op = %err.op, error = %err.source, "handler failed");
        });
        Peer {
            inner: Arc::new(PeerInner {
                transport: Arc::new(transport),
                channel: config.channel,
                identity,
                call_timeout: config.call_timeout,
                calls: CallTracker::new(),
                handlers: HandlerRegistry::new(),
                error_hook: std::sync::Mutex::new(default_hook),
                state: tokio::sync::Mutex::new(ChannelState::Idle),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// This peer's identity.
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// The broadcast channel address this peer uses.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Number of calls currently awaiting replies.
    pub fn pending_calls(&self) -> usize {
        self.inner.calls.pending_count()
    }

    /// Register `handler` for `op`, overwriting any existing binding.
    ///
    /// The handler receives the request envelope's payload (`None` when the
    /// request carried none) and returns `Ok(Some(payload))` to reply or
    /// `Ok(None)` to send no reply. Failures go to the error hook; the
    /// remote caller observes a timeout.
    pub fn add_handler<F, Fut>(&self, op: impl Into<String>, handler: F)
    where
        F: Fn(Option<Payload>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.handlers.add(op, handler);
    }

    /// Remove the handler for `op`. Requests arriving afterwards are ignored.
    pub fn remove_handler(&self, op: &str) {
        self.inner.handlers.remove(op);
    }

    /// Replace the hook invoked when a handler fails.
    pub fn set_error_hook(&self, hook: impl Fn(&HandlerError) + Send + Sync + 'static) {
        *self
            .inner
            .error_hook
            .lock()
            .expect("error hook lock poisoned") = Arc::new(hook);
    }

    /// Start the dispatch loop.
    ///
    /// Subscribes if no earlier `call`/`publish` already did, then spawns
    /// the loop task. Calling `start` on a running peer is a no-op; on a
    /// closed peer it fails with [`IpcError::Closed`].
    pub async fn start(&self) -> Result<(), IpcError> {
        let mut state = self.inner.state.lock().await;
        let subscription = match std::mem::replace(&mut *state, ChannelState::Closed) {
            ChannelState::Idle => {
                match self.inner.transport.subscribe(&self.inner.channel).await {
                    Ok(sub) => sub,
                    Err(err) => {
                        *state = ChannelState::Idle;
                        return Err(err.into());
                    }
                }
            }
            ChannelState::Subscribed(sub) => sub,
            running @ ChannelState::Receiving(_) => {
                *state = running;
                return Ok(());
            }
            ChannelState::Closed => return Err(IpcError::Closed),
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(PeerInner::run_loop(inner, subscription));
        *state = ChannelState::Receiving(handle);
        Ok(())
    }

    /// Issue a call and await the first reply, using the configured timeout.
    pub async fn call(&self, op: &str, data: Payload) -> Result<Payload, IpcError> {
        self.call_with_timeout(op, data, self.inner.call_timeout)
            .await
    }

    /// Issue a call and await the first reply within `timeout`.
    ///
    /// Publishes a request envelope carrying a fresh nonce and suspends until
    /// the dispatch loop resolves it with the first reply from another peer,
    /// or the deadline elapses ([`IpcError::CallTimeout`]). The pending entry
    /// is removed on every exit path, cancellation included.
    pub async fn call_with_timeout(
        &self,
        op: &str,
        data: Payload,
        timeout: Duration,
    ) -> Result<Payload, IpcError> {
        self.inner.ensure_channel().await?;

        let nonce = random_hex(16);
        let rx = self.inner.calls.register(&nonce);
        let _guard = self.inner.calls.guard(nonce.clone());

        let envelope = Envelope::request(
            op,
            Some(nonce),
            self.inner.identity.as_str(),
            non_empty(data),
        );
        self.inner
            .transport
            .publish(&self.inner.channel, envelope.encode()?)
            .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            // Slot dropped without resolution, or deadline elapsed: either
            // way no reply arrived in time.
            Ok(Err(_)) | Err(_) => Err(IpcError::CallTimeout(timeout)),
        }
    }

    /// Fire-and-forget broadcast of `op`: no nonce, no reply awaited.
    pub async fn publish(&self, op: &str, data: Payload) -> Result<(), IpcError> {
        self.inner.ensure_channel().await?;
        let envelope = Envelope::request(op, None, self.inner.identity.as_str(), non_empty(data));
        self.inner
            .transport
            .publish(&self.inner.channel, envelope.encode()?)
            .await?;
        Ok(())
    }

    /// Unsubscribe and stop the dispatch loop.
    ///
    /// Idempotent. In-flight handler tasks are left to finish; any replies
    /// they publish after the unsubscribe go to the remaining subscribers
    /// only. A closed peer cannot be restarted.
    pub async fn close(&self) -> Result<(), IpcError> {
        let previous = {
            let mut state = self.inner.state.lock().await;
            std::mem::replace(&mut *state, ChannelState::Closed)
        };
        self.inner.shutdown.cancel();

        match previous {
            ChannelState::Idle | ChannelState::Closed => Ok(()),
            ChannelState::Subscribed(sub) => {
                // Loop never started; tear the subscription down here.
                drop(sub);
                self.inner
                    .transport
                    .unsubscribe(&self.inner.channel)
                    .await
                    .map_err(IpcError::from)
            }
            ChannelState::Receiving(handle) => match handle.await {
                Ok(result) => result.map_err(IpcError::from),
                Err(join_err) => {
                    // External cancellation of the loop task is normal
                    // shutdown, not an error.
                    tracing::debug!(error = %join_err, "dispatch loop did not run to completion");
                    Ok(())
                }
            },
        }
    }
}

impl PeerInner {
    /// Idempotent lazy subscription, callable from the call-issuing path and
    /// the loop-starting path without ever subscribing twice.
    async fn ensure_channel(&self) -> Result<(), IpcError> {
        let mut state = self.state.lock().await;
        match &*state {
            ChannelState::Idle => {
                let sub = self.transport.subscribe(&self.channel).await?;
                tracing::debug!(channel = %self.channel, identity = %self.identity, "subscribed");
                *state = ChannelState::Subscribed(sub);
                Ok(())
            }
            ChannelState::Subscribed(_) | ChannelState::Receiving(_) => Ok(()),
            ChannelState::Closed => Err(IpcError::Closed),
        }
    }

    /// The dispatch loop. Runs until shutdown or until the subscription
    /// stream ends; unsubscribes on every exit path.
    async fn run_loop(
        inner: Arc<PeerInner>,
        mut subscription: Subscription,
    ) -> Result<(), TransportError> {
        tracing::debug!(channel = %inner.channel, identity = %inner.identity, "dispatch loop receiving");
        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {
                    tracing::debug!("dispatch loop shutting down");
                    break;
                }
                msg = subscription.recv() => {
                    match msg {
                        Some(msg) => PeerInner::dispatch(&inner, msg),
                        None => {
                            tracing::debug!("subscription stream ended");
                            break;
                        }
                    }
                }
            }
        }
        drop(subscription);
        inner.transport.unsubscribe(&inner.channel).await
    }

    /// Route one inbound transport message. Never blocks: request handling
    /// is spawned off as its own task.
    fn dispatch(inner: &Arc<Self>, msg: TransportMessage) {
        if msg.kind != MessageKind::Data {
            tracing::trace!("skipping control frame");
            return;
        }

        let envelope = match Envelope::decode(&msg.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Malformed inbound traffic is a per-message failure; the
                // loop keeps going.
                tracing::warn!(error = %err, "dropping malformed envelope");
                return;
            }
        };

        match envelope.kind() {
            EnvelopeKind::Reply => {
                if envelope.sender == inner.identity.as_str() {
                    // The transport loops our own publishes back; our own
                    // reply must not resolve our own pending call.
                    tracing::trace!("ignoring self-echoed reply");
                    return;
                }
                if let Some(nonce) = envelope.nonce {
                    inner
                        .calls
                        .resolve(&nonce, envelope.data.unwrap_or_default());
                }
            }
            EnvelopeKind::Request => {
                let Some(op) = envelope.op else {
                    return;
                };
                // Requests from self are served too: a peer may answer its
                // own broadcasts.
                let Some(handler) = inner.handlers.get(&op) else {
                    tracing::trace!(op = %op, "no handler bound");
                    return;
                };
                let inner = Arc::clone(inner);
                tokio::spawn(async move {
                    inner
                        .run_handler(op, handler, envelope.nonce, envelope.data)
                        .await;
                });
            }
            EnvelopeKind::Unroutable => {
                tracing::trace!(sender = %envelope.sender, "dropping unroutable envelope");
            }
        }
    }

    /// Invoke one handler and publish its reply, if any.
    async fn run_handler(
        &self,
        op: String,
        handler: Handler,
        nonce: Option<String>,
        data: Option<Payload>,
    ) {
        match handler(data).await {
            Ok(Some(result)) if !result.is_empty() => {
                let Some(nonce) = nonce else {
                    // Uncorrelated request: nobody is waiting for the result.
                    tracing::trace!(op = %op, "discarding result of uncorrelated request");
                    return;
                };
                let reply = Envelope::reply(nonce, self.identity.as_str(), Some(result));
                let bytes = match reply.encode() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(op = %op, error = %err, "failed to encode reply");
                        return;
                    }
                };
                if let Err(err) = self.transport.publish(&self.channel, bytes).await {
                    tracing::warn!(op = %op, error = %err, "failed to publish reply");
                }
            }
            Ok(_) => {
                // None or empty result suppresses the reply; the caller will
                // hear from some other peer or time out.
                tracing::trace!(op = %op, "handler returned no reply");
            }
            Err(source) => {
                let err = HandlerError { op, source };
                let hook = self
                    .error_hook
                    .lock()
                    .expect("error hook lock poisoned")
                    .clone();
                hook(&err);
            }
        }
    }
}

/// Empty payloads are omitted from the wire envelope.
fn non_empty(data: Payload) -> Option<Payload> {
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBroadcast;

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let hub = MemoryBroadcast::new();
        let peer = Peer::new(hub.handle());
        peer.start().await.unwrap();
        peer.start().await.unwrap();
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_on_closed_peer_fail() {
        let hub = MemoryBroadcast::new();
        let peer = Peer::new(hub.handle());
        peer.start().await.unwrap();
        peer.close().await.unwrap();

        assert!(matches!(peer.start().await, Err(IpcError::Closed)));
        assert!(matches!(
            peer.publish("op", Payload::new()).await,
            Err(IpcError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let hub = MemoryBroadcast::new();
        let peer = Peer::new(hub.handle());
        peer.start().await.unwrap();
        peer.close().await.unwrap();
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_without_start_unsubscribes_lazy_channel() {
        let hub = MemoryBroadcast::new();
        let peer = Peer::new(hub.handle());

        // publish() establishes the subscription lazily.
        peer.publish("ping", Payload::new()).await.unwrap();
        assert_eq!(hub.subscriber_count(peer.channel()), 1);

        peer.close().await.unwrap();
        assert_eq!(hub.subscriber_count(peer.channel()), 0);
    }

    #[tokio::test]
    async fn test_explicit_identity_is_kept() {
        let hub = MemoryBroadcast::new();
        let peer = Peer::with_config(
            hub.handle(),
            PeerConfig::default().with_identity("gateway-1"),
        );
        assert_eq!(peer.identity().as_str(), "gateway-1");
    }
}
