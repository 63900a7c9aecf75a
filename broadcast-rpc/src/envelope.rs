//! Wire envelope for broadcast RPC messages.
//!
//! Every message on the channel is one JSON object:
//!
//! ```text
//! { "op": string?,      // present only on requests
//!   "nonce": string?,   // call identifier; on correlated requests and all replies
//!   "sender": string,   // identity of the originator
//!   "data": object? }   // arbitrary payload
//! ```
//!
//! Classification invariant: an envelope is a *request* iff `op` is present,
//! and a *reply* iff `op` is absent and `nonce` is present. Anything else is
//! unroutable and dropped by the dispatch loop.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Structured payload carried by requests and replies.
///
/// A mapping from string keys to JSON-compatible values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// How the dispatch loop should route an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Carries an `op`: dispatched to a registered handler.
    Request,
    /// No `op` but a `nonce`: resolves a pending call.
    Reply,
    /// Neither request nor reply; dropped.
    Unroutable,
}

/// The wire unit exchanged over the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation name; present only on requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,

    /// Call identifier correlating a request with its reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Identity of the envelope's originator.
    pub sender: String,

    /// Structured payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl Envelope {
    /// Build a request envelope.
    ///
    /// `nonce` is `Some` for correlated requests issued by `call` and `None`
    /// for fire-and-forget publishes.
    pub fn request(
        op: impl Into<String>,
        nonce: Option<String>,
        sender: impl Into<String>,
        data: Option<Payload>,
    ) -> Self {
        Envelope {
            op: Some(op.into()),
            nonce,
            sender: sender.into(),
            data,
        }
    }

    /// Build a reply envelope for the given call nonce.
    ///
    /// Replies never carry an `op`; that is what marks them as replies.
    pub fn reply(nonce: impl Into<String>, sender: impl Into<String>, data: Option<Payload>) -> Self {
        Envelope {
            op: None,
            nonce: Some(nonce.into()),
            sender: sender.into(),
            data,
        }
    }

    /// Classify this envelope per the routing invariant.
    pub fn kind(&self) -> EnvelopeKind {
        match (&self.op, &self.nonce) {
            (Some(_), _) => EnvelopeKind::Request,
            (None, Some(_)) => EnvelopeKind::Reply,
            (None, None) => EnvelopeKind::Unroutable,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    /// Deserialize from the JSON wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_request_classification() {
        let env = Envelope::request("echo", Some("abc".into()), "peer-a", None);
        assert_eq!(env.kind(), EnvelopeKind::Request);

        // Fire-and-forget publishes are still requests.
        let env = Envelope::request("echo", None, "peer-a", None);
        assert_eq!(env.kind(), EnvelopeKind::Request);
    }

    #[test]
    fn test_reply_classification() {
        let env = Envelope::reply("abc", "peer-b", None);
        assert_eq!(env.kind(), EnvelopeKind::Reply);
    }

    #[test]
    fn test_unroutable_classification() {
        let env = Envelope {
            op: None,
            nonce: None,
            sender: "peer-a".into(),
            data: None,
        };
        assert_eq!(env.kind(), EnvelopeKind::Unroutable);
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let env = Envelope::reply("abc", "peer-b", None);
        let bytes = env.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("op"));
        assert!(!object.contains_key("data"));
        assert_eq!(object["nonce"], "abc");
        assert_eq!(object["sender"], "peer-b");
    }

    #[test]
    fn test_decode_wire_request() {
        let raw = br#"{"op":"echo","nonce":"n1","sender":"peer-a","data":{"msg":"x"}}"#;
        let env = Envelope::decode(raw).unwrap();
        assert_eq!(env.op.as_deref(), Some("echo"));
        assert_eq!(env.nonce.as_deref(), Some("n1"));
        assert_eq!(env.sender, "peer-a");
        assert_eq!(env.data, Some(payload(&[("msg", json!("x"))])));
    }

    #[test]
    fn test_decode_malformed_payload() {
        assert!(matches!(
            Envelope::decode(b"not json"),
            Err(CodecError::Decode(_))
        ));
        // A JSON value of the wrong shape is also a decode failure.
        assert!(matches!(
            Envelope::decode(b"[1,2,3]"),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_round_trip_preserves_payload() {
        let env = Envelope::request(
            "data",
            Some("n2".into()),
            "peer-a",
            Some(payload(&[("count", json!(3)), ("tags", json!(["a", "b"]))])),
        );
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }
}
