//! Peer configuration.

use std::time::Duration;

/// Configuration for a [`Peer`](crate::Peer).
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Broadcast channel address all peers share.
    pub channel: String,

    /// Explicit peer identity. `None` generates a random hex token.
    pub identity: Option<String>,

    /// Default deadline for `call` before it fails with `CallTimeout`.
    pub call_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            channel: "ipc:1".to_string(),
            identity: None,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl PeerConfig {
    /// Set the broadcast channel address.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set an explicit peer identity instead of a generated one.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the default call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PeerConfig::default();
        assert_eq!(config.channel, "ipc:1");
        assert!(config.identity.is_none());
        assert_eq!(config.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_with_helpers() {
        let config = PeerConfig::default()
            .with_channel("ipc:42")
            .with_identity("gateway")
            .with_call_timeout(Duration::from_millis(250));
        assert_eq!(config.channel, "ipc:42");
        assert_eq!(config.identity.as_deref(), Some("gateway"));
        assert_eq!(config.call_timeout, Duration::from_millis(250));
    }
}
