//! Reserved message kinds and naming conventions.
//!
//! The handshake exchange owns two kinds outright. Responses synthesized for
//! handler-served requests reuse the request kind with a `:response` suffix,
//! and sub-channels prefix kinds with `<namespace>:`.

/// Carries the shared token from the initiating endpoint.
pub const HANDSHAKE: &str = "handshake";

/// Carries the acknowledged token back to the initiator.
pub const HANDSHAKE_RESPONSE: &str = "handshake:response";

/// Suffix appended to a request kind to form its response kind.
pub const RESPONSE_SUFFIX: &str = ":response";

/// Separator between a sub-channel namespace and the inner kind.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Kind of the response synthesized for a request of `kind`.
pub fn response_kind(kind: &str) -> String {
    format!("{kind}{RESPONSE_SUFFIX}")
}

/// Kind as seen on the wire when sent through sub-channel `namespace`.
pub fn namespaced(namespace: &str, kind: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{kind}")
}

/// Whether `kind` is owned by the handshake exchange.
pub fn is_reserved(kind: &str) -> bool {
    kind == HANDSHAKE || kind == HANDSHAKE_RESPONSE
}
