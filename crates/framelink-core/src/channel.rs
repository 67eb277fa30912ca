//! Namespaced sub-channels.
//!
//! A [`SubChannel`] shares its endpoint's transport, handler registry and
//! pending table, prefixing every kind with `<namespace>:`. Handlers of
//! different sub-channels therefore never collide, and a handler registered
//! under `ns:kind` on the root endpoint is the same registration.

use framelink_proto::{Payload, kinds};

use crate::{endpoint::Endpoint, error::EndpointError, pending::ResponseFuture, registry::Handler};

/// Facade over an [`Endpoint`] scoped to one namespace.
#[derive(Debug, Clone)]
pub struct SubChannel {
    endpoint: Endpoint,
    namespace: String,
}

impl SubChannel {
    pub(crate) fn new(endpoint: Endpoint, namespace: impl Into<String>) -> Self {
        Self { endpoint, namespace: namespace.into() }
    }

    /// Namespace prefix (without the separator).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Register `handler` for `<namespace>:<kind>`.
    pub fn on(&self, kind: &str, handler: Handler) {
        self.endpoint.on(&self.scoped(kind), handler);
    }

    /// Remove the handler for `<namespace>:<kind>`.
    pub fn off(&self, kind: &str, handler: Option<&Handler>) {
        self.endpoint.off(&self.scoped(kind), handler);
    }

    /// Send `<namespace>:<kind>`.
    ///
    /// # Errors
    ///
    /// As [`Endpoint::send`].
    pub fn send(&self, kind: &str, payload: impl Into<Option<Payload>>) -> Result<(), EndpointError> {
        self.endpoint.send(&self.scoped(kind), payload)
    }

    /// Request `<namespace>:<kind>`; the response arrives as
    /// `<namespace>:<kind>:response`.
    ///
    /// # Errors
    ///
    /// As [`Endpoint::request`].
    pub fn request(
        &self,
        kind: &str,
        payload: impl Into<Option<Payload>>,
    ) -> Result<ResponseFuture, EndpointError> {
        self.endpoint.request(&self.scoped(kind), payload)
    }

    /// Nested sub-channel `<namespace>:<name>`.
    pub fn channel(&self, name: &str) -> SubChannel {
        SubChannel::new(self.endpoint.clone(), self.scoped(name))
    }

    fn scoped(&self, kind: &str) -> String {
        kinds::namespaced(&self.namespace, kind)
    }
}
