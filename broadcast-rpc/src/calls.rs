//! Pending-call tracking for request/reply correlation.
//!
//! Every `call` registers a fresh nonce here before its request envelope goes
//! out. The dispatch loop resolves the entry when the first matching reply
//! arrives; the caller's timeout or cancellation discards it. Either way the
//! entry leaves the map exactly once, which is what makes resolution
//! idempotent: a second reply for the same nonce finds nothing to resolve.
//!
//! ```text
//! call() ──register(nonce)──▶ pending map ──resolve(nonce)──▶ oneshot fires
//!    │                            ▲                                │
//!    └──── CallGuard drop ────────┘ (timeout / cancellation)       ▼
//!                                                        caller resumes
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::envelope::Payload;

/// One outstanding `call` awaiting its reply.
#[derive(Debug)]
struct PendingCall {
    /// Single-assignment result slot; consumed on resolution.
    slot: oneshot::Sender<Payload>,

    /// When the call was issued, for diagnostics.
    started: Instant,
}

impl PendingCall {
    fn complete(self, payload: Payload) {
        // The receiver is dropped when the caller timed out or was cancelled
        // between our map removal and this send; nothing to do then.
        if self.slot.send(payload).is_err() {
            tracing::debug!("pending call resolved but caller already gone");
        }
    }
}

/// Maps in-flight call nonces to their pending result slots.
///
/// Mutated from the calling task (`register`, guard drop) and from the
/// dispatch loop (`resolve`), so the map sits behind a mutex. The lock is
/// only ever held for map operations, never across an await.
#[derive(Debug, Default)]
pub struct CallTracker {
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl CallTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call under `nonce` and return the receiving half
    /// of its result slot.
    pub fn register(&self, nonce: &str) -> oneshot::Receiver<Payload> {
        let (tx, rx) = oneshot::channel();
        let call = PendingCall {
            slot: tx,
            started: Instant::now(),
        };
        self.pending
            .lock()
            .expect("call tracker lock poisoned")
            .insert(nonce.to_string(), call);
        rx
    }

    /// Resolve the pending call for `nonce` with `payload`.
    ///
    /// Returns `true` if a pending call existed. Unknown nonces are not an
    /// error: the reply may belong to another peer's call, or the entry may
    /// already be gone (expired, or won by an earlier reply).
    pub fn resolve(&self, nonce: &str, payload: Payload) -> bool {
        let call = self
            .pending
            .lock()
            .expect("call tracker lock poisoned")
            .remove(nonce);
        match call {
            Some(call) => {
                tracing::debug!(nonce, elapsed = ?call.started.elapsed(), "resolving pending call");
                call.complete(payload);
                true
            }
            None => {
                tracing::trace!(nonce, "no pending call for nonce");
                false
            }
        }
    }

    /// Remove the entry for `nonce` without resolving it, if still present.
    pub fn discard(&self, nonce: &str) {
        self.pending
            .lock()
            .expect("call tracker lock poisoned")
            .remove(nonce);
    }

    /// Guard that discards `nonce` when dropped.
    ///
    /// Held across the await in `call` so the entry is removed on every exit
    /// path: success (already removed by `resolve`, discard is a no-op),
    /// timeout, and cancellation of the calling task.
    pub fn guard(&self, nonce: String) -> CallGuard<'_> {
        CallGuard {
            tracker: self,
            nonce,
        }
    }

    /// Number of calls currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .expect("call tracker lock poisoned")
            .len()
    }
}

/// Removes a pending-call entry on drop. See [`CallTracker::guard`].
#[derive(Debug)]
pub struct CallGuard<'a> {
    tracker: &'a CallTracker,
    nonce: String,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.tracker.discard(&self.nonce);
    }
}
