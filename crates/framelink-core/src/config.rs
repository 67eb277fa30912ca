//! Endpoint configuration.

use std::fmt;

/// Origin filter and outbound address.
///
/// Inbound deliveries whose reported origin fails [`Origin::accepts`] are
/// discarded. Outbound frames are posted with the same value as their target
/// address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Accept from (and post to) anywhere
    #[default]
    Any,
    /// Byte-exact origin string
    Exact(String),
}

impl Origin {
    /// Wildcard spelling accepted by [`Origin::parse`].
    pub const WILDCARD: &'static str = "*";

    /// Parse an origin, treating `"*"` as [`Origin::Any`].
    pub fn parse(origin: &str) -> Self {
        if origin == Self::WILDCARD { Self::Any } else { Self::Exact(origin.to_owned()) }
    }

    /// Whether a delivery reported as coming from `origin` passes the filter.
    pub fn accepts(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected.as_bytes() == origin.as_bytes(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(Self::WILDCARD),
            Self::Exact(origin) => f.write_str(origin),
        }
    }
}

/// Construction-time endpoint options.
#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    /// Inbound origin filter and outbound address
    pub origin: Origin,
    /// Shared token; when set, `request` is gated on a completed handshake
    pub handshake_token: Option<String>,
    /// Emit debug-level tracing for sends, receives, handshake and plugins
    pub debug: bool,
}

impl EndpointConfig {
    /// Restrict traffic to a single origin.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Require a handshake with `token` before requests are allowed.
    #[must_use]
    pub fn with_handshake_token(mut self, token: impl Into<String>) -> Self {
        self.handshake_token = Some(token.into());
        self
    }

    /// Toggle diagnostic tracing.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_anything() {
        let config = EndpointConfig::default();
        assert_eq!(config.origin, Origin::Any);
        assert!(config.handshake_token.is_none());
        assert!(!config.debug);
        assert!(config.origin.accepts("https://evil.example"));
    }

    #[test]
    fn exact_origin_is_byte_equal() {
        let origin = Origin::parse("https://host.example");
        assert!(origin.accepts("https://host.example"));
        assert!(!origin.accepts("https://host.example/"));
        assert!(!origin.accepts("HTTPS://host.example"));
        assert!(!origin.accepts(""));
    }

    #[test]
    fn wildcard_parses_to_any() {
        assert_eq!(Origin::parse("*"), Origin::Any);
        assert_eq!(Origin::Any.to_string(), "*");
    }
}
