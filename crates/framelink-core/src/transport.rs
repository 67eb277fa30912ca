//! Transport capability consumed by the endpoint.
//!
//! The transport is an external collaborator: unreliable, possibly
//! reordering, at-most-once, with no acknowledgments. The endpoint only needs
//! to post frames, subscribe to deliveries and unsubscribe again.
//!
//! Implementations must not invoke listeners from inside [`Transport::post`].
//! Deliveries are queued and dispatched later from the event loop, which is
//! what keeps protocol processing free of re-entrancy.

use std::rc::Rc;

use bytes::Bytes;

use crate::{config::Origin, error::TransportError};

/// Inbound frame annotated with the sender's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Origin reported by the transport for the sender
    pub origin: String,
    /// Encoded envelope
    pub frame: Bytes,
}

impl Delivery {
    /// Create a delivery.
    pub fn new(origin: impl Into<String>, frame: Bytes) -> Self {
        Self { origin: origin.into(), frame }
    }
}

/// Callback invoked once per delivered frame.
pub type Listener = Rc<dyn Fn(Delivery)>;

/// Callback invoked once the transport becomes usable.
pub type ReadyCallback = Box<dyn FnOnce()>;

/// Handle identifying a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Injectable transport capability.
///
/// One instance is the endpoint's view of its link to the peer (a window, a
/// frame, a port). Multiple endpoints may share a transport.
pub trait Transport {
    /// Post an encoded envelope to the peer, addressed with `target`.
    ///
    /// Fire-and-forget: `Ok` means the transport accepted the frame, not that
    /// the peer received it.
    fn post(&self, frame: Bytes, target: &Origin) -> Result<(), TransportError>;

    /// Start receiving deliveries.
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Stop receiving deliveries for `subscription`. Unknown ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Whether the local environment has finished initializing.
    fn is_ready(&self) -> bool {
        true
    }

    /// Run `callback` once the transport is ready.
    ///
    /// Must not block. The default runs the callback immediately.
    fn when_ready(&self, callback: ReadyCallback) {
        callback();
    }
}
