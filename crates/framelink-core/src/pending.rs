//! Pending-request table and correlation ids.
//!
//! Each in-flight request owns one entry keyed by its [`RequestId`]. The
//! entry is consumed exactly once, when a response carrying that id arrives.
//! Entries are never expired: a peer that never answers leaves the caller's
//! [`ResponseFuture`] pending forever. Callers that need bounded waiting wrap
//! the future in their own timeout.
//!
//! # Id scheme
//!
//! `<nonce>-<counter>`: a random 64-bit nonce drawn once per endpoint and a
//! monotonic counter. Candidates are checked against the live table before
//! use. The nonce keeps two endpoints that talk to each other from issuing
//! equal ids, which would make one side mistake an inbound request for the
//! response to its own.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use framelink_proto::{Payload, RequestId};
use futures::{FutureExt, channel::oneshot};

/// Per-endpoint correlation id generator.
#[derive(Debug, Clone)]
pub struct CorrelationIds {
    nonce: u64,
    next: u64,
}

impl CorrelationIds {
    /// Generator with a freshly drawn nonce.
    pub fn new() -> Self {
        Self::with_nonce(rand::random())
    }

    /// Generator with a fixed nonce (deterministic tests).
    pub fn with_nonce(nonce: u64) -> Self {
        Self { nonce, next: 0 }
    }

    /// Next candidate id. Not checked for collisions.
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(format!("{:016x}-{}", self.nonce, self.next));
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Future resolved with the payload of the matching response.
///
/// Never resolves if no response arrives. If the owning endpoint is
/// destroyed, the entry is dropped without being settled and the future stays
/// pending.
#[derive(Debug)]
#[must_use = "the response is only observable by polling the future"]
pub struct ResponseFuture {
    request_id: RequestId,
    receiver: oneshot::Receiver<Option<Payload>>,
}

impl ResponseFuture {
    /// Correlation id carried by the request.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for ResponseFuture {
    type Output = Option<Payload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(payload)) => Poll::Ready(payload),
            // Resolver dropped unsettled (endpoint destroyed)
            Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
        }
    }
}

/// Mapping from correlation id to single-use resolver.
#[derive(Debug, Default)]
pub struct PendingRequests {
    ids: CorrelationIds,
    entries: HashMap<RequestId, oneshot::Sender<Option<Payload>>>,
}

impl PendingRequests {
    /// Empty table with a random id nonce.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table using a specific id generator.
    pub fn with_ids(ids: CorrelationIds) -> Self {
        Self { ids, entries: HashMap::new() }
    }

    /// Allocate an id unique among in-flight requests and register its
    /// resolver.
    pub fn register(&mut self) -> ResponseFuture {
        let request_id = loop {
            let candidate = self.ids.next_id();
            if !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };

        let (sender, receiver) = oneshot::channel();
        self.entries.insert(request_id.clone(), sender);
        ResponseFuture { request_id, receiver }
    }

    /// Consume the entry for `request_id`, resolving its future.
    ///
    /// Returns `false` if no such request is in flight. A caller that already
    /// dropped its future still consumes the entry.
    pub fn resolve(&mut self, request_id: &RequestId, payload: Option<Payload>) -> bool {
        match self.entries.remove(request_id) {
            Some(sender) => {
                // Receiver may be gone; the entry is consumed either way
                let _ = sender.send(payload);
                true
            },
            None => false,
        }
    }

    /// Remove an entry without settling it.
    pub fn forget(&mut self, request_id: &RequestId) -> bool {
        self.entries.remove(request_id).is_some()
    }

    /// Whether `request_id` is in flight.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry without settling it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::FutureExt;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ids_embed_nonce_and_counter() {
        let mut ids = CorrelationIds::with_nonce(0xabc);
        assert_eq!(ids.next_id().as_str(), "0000000000000abc-0");
        assert_eq!(ids.next_id().as_str(), "0000000000000abc-1");
    }

    #[test]
    fn resolve_consumes_entry_once() {
        let mut pending = PendingRequests::with_ids(CorrelationIds::with_nonce(1));
        let future = pending.register();
        let id = future.request_id().clone();

        assert!(pending.resolve(&id, Some(Payload::from("X"))));
        assert!(!pending.resolve(&id, Some(Payload::from("Y"))));
        assert!(pending.is_empty());
        assert_eq!(future.now_or_never(), Some(Some(Payload::from("X"))));
    }

    #[test]
    fn unknown_id_is_not_resolved() {
        let mut pending = PendingRequests::new();
        let _future = pending.register();
        assert!(!pending.resolve(&RequestId::from("nope"), None));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn cleared_entries_leave_futures_pending() {
        let mut pending = PendingRequests::new();
        let future = pending.register();
        pending.clear();

        assert_eq!(future.now_or_never(), None);
    }

    #[test]
    fn register_skips_ids_still_in_flight() {
        let mut pending = PendingRequests::with_ids(CorrelationIds::with_nonce(7));
        let first = pending.register();

        // Rewind the generator so the next candidate collides with `first`
        pending.ids = CorrelationIds::with_nonce(7);
        let second = pending.register();

        assert_ne!(first.request_id(), second.request_id());
        assert_eq!(second.request_id().as_str(), "0000000000000007-1");
    }

    proptest! {
        #[test]
        fn in_flight_ids_are_unique(resolve_mask in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut pending = PendingRequests::new();
            let mut live = HashSet::new();

            for resolve in resolve_mask {
                let future = pending.register();
                let id = future.request_id().clone();
                prop_assert!(live.insert(id.clone()), "duplicate in-flight id {}", id);

                if resolve {
                    pending.resolve(&id, None);
                    live.remove(&id);
                }
            }

            prop_assert_eq!(pending.len(), live.len());
        }
    }
}
