//! Peer identity and random token generation.
//!
//! Every peer on a channel carries an opaque identity string. It exists so a
//! peer can recognize its own broadcasts coming back from the transport (every
//! publish is delivered to the publisher too) and as advisory metadata on
//! outgoing envelopes. It is not a security boundary.

use std::fmt;

use rand::RngCore;

/// Generate a random token of `bytes` random bytes, hex-encoded.
///
/// Used for peer identities and per-call nonces. With the default 16 bytes
/// (128 bits of entropy) collisions are not a practical concern.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    let mut out = String::with_capacity(bytes * 2);
    for byte in buf {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Opaque identifier for one peer on a channel.
///
/// Immutable for the peer's lifetime. Either supplied at construction or
/// freshly generated with [`Identity::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Generate a fresh random identity (16 random bytes, hex-encoded).
    pub fn generate() -> Self {
        Identity(random_hex(16))
    }

    /// View the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity(value.to_string())
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
