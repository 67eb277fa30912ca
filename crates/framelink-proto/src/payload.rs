//! Opaque payload values.
//!
//! A payload is any CBOR value. The protocol never inspects it except to
//! compare handshake tokens, so message kinds agree on their own shapes and
//! convert explicitly:
//!
//! ```
//! use framelink_proto::Payload;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct GetUser {
//!     id: u64,
//! }
//!
//! let payload = Payload::encode(&GetUser { id: 1 }).unwrap();
//! assert_eq!(payload.decode::<GetUser>().unwrap(), GetUser { id: 1 });
//! ```

use ciborium::Value;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Opaque, transport-serializable message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    /// Wrap a raw CBOR value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Serialize any serde type into a payload.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Value::serialized(value).map(Self).map_err(|e| ProtocolError::Payload(e.to_string()))
    }

    /// Deserialize the payload into the shape expected by a message kind.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.0.deserialized().map_err(|e| ProtocolError::Payload(e.to_string()))
    }

    /// Text content, if the payload is a string.
    pub fn as_text(&self) -> Option<&str> {
        self.0.as_text()
    }

    /// Borrow the underlying CBOR value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the payload, returning the underlying CBOR value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(Value::Text(text.to_owned()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(Value::Text(text))
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Self(Value::Integer(n.into()))
    }
}

impl From<u64> for Payload {
    fn from(n: u64) -> Self {
        Self(Value::Integer(n.into()))
    }
}

impl From<bool> for Payload {
    fn from(flag: bool) -> Self {
        Self(Value::Bool(flag))
    }
}
