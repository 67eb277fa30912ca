//! Message envelope and its CBOR encoding.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    payload::Payload,
};

/// Maximum encoded envelope size accepted by [`Envelope::decode`] (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Opaque correlation token linking a request to its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an existing token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// The unit exchanged over the transport.
///
/// On the wire this is a map `{ type, payload?, requestId? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Semantic message kind. Never empty once decoded.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque message body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Correlation token, present only for request/response exchanges
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl Envelope {
    /// Create a fire-and-forget envelope.
    pub fn new(kind: impl Into<String>, payload: Option<Payload>) -> Self {
        Self { kind: kind.into(), payload, request_id: None }
    }

    /// Create an envelope that expects (or answers) a correlated response.
    pub fn request(kind: impl Into<String>, payload: Option<Payload>, request_id: RequestId) -> Self {
        Self { kind: kind.into(), payload, request_id: Some(request_id) }
    }

    /// Serialize to a CBOR frame.
    ///
    /// # Errors
    ///
    /// - `EmptyType` if the kind is empty
    /// - `FrameTooLarge` if the encoded frame exceeds [`MAX_FRAME_SIZE`]
    /// - `Encode` if serialization fails
    pub fn encode(&self) -> Result<Bytes> {
        if self.kind.is_empty() {
            return Err(ProtocolError::EmptyType);
        }

        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: buf.len(), max: MAX_FRAME_SIZE });
        }

        Ok(Bytes::from(buf))
    }

    /// Parse a CBOR frame.
    ///
    /// The size limit is checked before any parsing happens.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: frame.len(), max: MAX_FRAME_SIZE });
        }

        let envelope: Self =
            ciborium::de::from_reader(frame).map_err(|e| ProtocolError::Decode(e.to_string()))?;

        if envelope.kind.is_empty() {
            return Err(ProtocolError::EmptyType);
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decode_minimal_envelope() {
        // {"type": "ping"}
        let frame = hex!("a1 64 74797065 64 70696e67");
        let envelope = Envelope::decode(&frame).unwrap();

        assert_eq!(envelope.kind, "ping");
        assert_eq!(envelope.payload, None);
        assert_eq!(envelope.request_id, None);
    }

    #[test]
    fn decode_uses_wire_field_names() {
        // {"type": "a", "payload": "b", "requestId": "c"}
        let frame = hex!(
            "a3 64 74797065 61 61
                67 7061796c6f6164 61 62
                69 726571756573744964 61 63"
        );
        let envelope = Envelope::decode(&frame).unwrap();

        assert_eq!(envelope.kind, "a");
        assert_eq!(envelope.payload, Some(Payload::from("b")));
        assert_eq!(envelope.request_id, Some(RequestId::from("c")));
    }

    #[test]
    fn encode_omits_absent_fields() {
        let frame = Envelope::new("ping", None).encode().unwrap();
        assert_eq!(frame.as_ref(), hex!("a1 64 74797065 64 70696e67"));
    }

    #[test]
    fn request_survives_encoding() {
        let envelope =
            Envelope::request("getUser", Some(Payload::from(1_u64)), RequestId::from("r-1"));
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn empty_kind_rejected_both_ways() {
        assert_eq!(Envelope::new("", None).encode(), Err(ProtocolError::EmptyType));

        // {"type": ""}
        let frame = hex!("a1 64 74797065 60");
        assert_eq!(Envelope::decode(&frame), Err(ProtocolError::EmptyType));
    }

    #[test]
    fn missing_kind_is_decode_error() {
        // {"payload": 1}
        let frame = hex!("a1 67 7061796c6f6164 01");
        assert!(matches!(Envelope::decode(&frame), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn oversized_frame_rejected_before_parsing() {
        let frame = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            Envelope::decode(&frame),
            Err(ProtocolError::FrameTooLarge { size, max }) if size == MAX_FRAME_SIZE + 1 && max == MAX_FRAME_SIZE
        ));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Envelope::decode(&bytes);
        }

        #[test]
        fn decoded_kind_is_never_empty(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            if let Ok(envelope) = Envelope::decode(&bytes) {
                prop_assert!(!envelope.kind.is_empty());
            }
        }
    }
}
