//! Endpoint error types.

use std::fmt;

use framelink_proto::ProtocolError;
use thiserror::Error;

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transport is gone (peer detached, link torn down)
    #[error("transport closed")]
    Closed,

    /// Transport refused the frame
    #[error("transport rejected frame: {0}")]
    Rejected(String),
}

/// Failure raised by a plugin hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PluginError {
    message: String,
}

impl PluginError {
    /// Create a hook failure with a human-readable reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Reason given by the plugin.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Direction of the pipeline pass that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Outgoing transform
    BeforeSend,
    /// Incoming transform
    AfterReceive,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeSend => f.write_str("before_send"),
            Self::AfterReceive => f.write_str("after_receive"),
        }
    }
}

/// Errors surfaced by endpoint operations.
///
/// Classification outcomes (origin mismatch, unhandled type, rejected
/// handshake) are not errors; they are reported through
/// [`crate::InboundOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// `request` called before a configured handshake completed
    #[error("handshake incomplete: requests are blocked until the handshake completes")]
    HandshakeIncomplete,

    /// A plugin hook failed and aborted the message
    #[error("plugin {plugin} failed in {stage}: {source}")]
    Pipeline {
        /// Name of the failing plugin
        plugin: String,
        /// Direction being processed
        stage: PipelineStage,
        /// Error raised by the hook
        source: PluginError,
    },

    /// Envelope could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport refused the frame
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation on an endpoint after `destroy`
    #[error("endpoint destroyed")]
    Destroyed,

    /// Handler returned a deferred reply but no spawner is configured, or
    /// the spawner has shut down
    #[error("deferred reply for {kind} needs a running spawner")]
    NoSpawner {
        /// Kind of the message whose handler deferred
        kind: String,
    },

    /// Message kind is empty
    #[error("message type must not be empty")]
    EmptyType,
}
