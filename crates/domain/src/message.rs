//! Signed message envelope: the unit exchanged over the broker.
//!
//! Every frame is a JSON object `{header, payload}`. The header carries a
//! signature computed as `md5_hex(messageId + key + timestamp)`; inbound frames
//! are only handed out by [`Envelope::decode`] once that signature checks out.

use md5::{Digest, Md5};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::id::MessageId;
use crate::namespace::Namespace;

/// Version of the payload schema stamped on outbound frames.
pub const PAYLOAD_VERSION: u8 = 1;

/// Envelope method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Set,
    GetAck,
    SetAck,
    Error,
    Push,
}

impl Method {
    /// Whether the method acknowledges a request this client sent.
    #[must_use]
    pub fn is_ack(self) -> bool {
        matches!(self, Self::GetAck | Self::SetAck | Self::Error)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::GetAck => "GETACK",
            Self::SetAck => "SETACK",
            Self::Error => "ERROR",
            Self::Push => "PUSH",
        })
    }
}

/// Envelope header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Topic of the sender: where acknowledgements go, or which device pushed.
    pub from: String,
    pub message_id: MessageId,
    pub method: Method,
    pub namespace: Namespace,
    #[serde(default = "default_payload_version")]
    pub payload_version: u8,
    pub sign: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

fn default_payload_version() -> u8 {
    PAYLOAD_VERSION
}

/// A complete frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reasons an inbound frame is rejected.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Not JSON, or not shaped like an envelope.
    #[error("malformed envelope")]
    Malformed(#[from] serde_json::Error),

    /// The header signature does not match the shared key.
    #[error("invalid signature on message {0}")]
    SignatureInvalid(MessageId),
}

impl Envelope {
    /// Build a signed request with a fresh message id and the current time.
    #[must_use]
    pub fn request(
        method: Method,
        namespace: Namespace,
        payload: serde_json::Value,
        from: &str,
        key: &str,
    ) -> Self {
        Self::signed(
            method,
            namespace,
            payload,
            from,
            key,
            new_message_id(),
            crate::time::now().timestamp(),
        )
    }

    /// Build a signed envelope from explicit parts.
    #[must_use]
    pub fn signed(
        method: Method,
        namespace: Namespace,
        payload: serde_json::Value,
        from: &str,
        key: &str,
        message_id: MessageId,
        timestamp: i64,
    ) -> Self {
        let sign = sign(&message_id, key, timestamp);
        Self {
            header: Header {
                from: from.to_string(),
                message_id,
                method,
                namespace,
                payload_version: PAYLOAD_VERSION,
                sign,
                timestamp,
            },
            payload,
        }
    }

    /// Serialize the envelope to its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame and verify its signature against `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] when the bytes are not an envelope and
    /// [`CodecError::SignatureInvalid`] when the signature does not match.
    pub fn decode(bytes: &[u8], key: &str) -> Result<Self, CodecError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if !envelope.verify(key) {
            return Err(CodecError::SignatureInvalid(envelope.header.message_id));
        }
        Ok(envelope)
    }

    /// Check the header signature against `key`.
    #[must_use]
    pub fn verify(&self, key: &str) -> bool {
        let expected = sign(&self.header.message_id, key, self.header.timestamp);
        expected.eq_ignore_ascii_case(&self.header.sign)
    }
}

/// Lowercase hex MD5 digest of `input`.
#[must_use]
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Compute the header signature.
#[must_use]
pub fn sign(message_id: &MessageId, key: &str, timestamp: i64) -> String {
    md5_hex(&format!("{message_id}{key}{timestamp}"))
}

/// Generate a request id: the MD5 of 16 random alphanumeric characters.
#[must_use]
pub fn new_message_id() -> MessageId {
    let seed: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    MessageId::new(md5_hex(&seed))
}
