//! Wire format for the Framelink protocol.
//!
//! Every unit exchanged between two endpoints is an [`Envelope`]: a message
//! kind, an optional opaque payload, and an optional correlation token that
//! links a request to its response. Envelopes travel as CBOR maps with the
//! keys `type`, `payload` and `requestId`; absent fields are omitted.
//!
//! Payloads stay opaque at this layer. Each message kind decides its own
//! payload shape and decodes it explicitly with [`Payload::decode`].
//!
//! # Security
//!
//! Decoding enforces a 16 MB frame limit and rejects envelopes with an empty
//! message kind. Nothing here authenticates or encrypts content.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod errors;
pub mod kinds;
pub mod payload;

pub use envelope::{Envelope, MAX_FRAME_SIZE, RequestId};
pub use errors::{ProtocolError, Result};
pub use payload::Payload;
