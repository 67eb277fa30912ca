//! Framelink protocol engine
//!
//! Request/response correlation, type-routed dispatch, an optional token
//! handshake, namespaced sub-channels and a transform pipeline, layered over
//! an unreliable fire-and-forget transport.
//!
//! # Architecture
//!
//! Everything runs on one thread. Inbound deliveries and outbound calls are
//! processed synchronously from start to finish; the only suspension points
//! are the futures returned by [`Endpoint::request`] and
//! [`Endpoint::handshake`], which complete when a matching envelope arrives.
//!
//! ```text
//!             ┌──────────────────────── Endpoint ─────────────────────────┐
//!  Transport ─┼─> decode ─> after_receive ─> origin ─┬─> HandshakeMachine  │
//!             │                                      ├─> PendingRequests   │
//!             │                                      └─> HandlerRegistry   │
//!  Transport <┼── encode <─ before_send <─── send / request / responses    │
//!             └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport is injected ([`transport::Transport`]), so endpoints run
//! unchanged against a real host bridge or the deterministic simulation in
//! `framelink-harness`.
//!
//! # Components
//!
//! - [`endpoint`]: Channel endpoint (dispatch, correlation, lifecycle)
//! - [`handshake`]: Handshake state machine
//! - [`pipeline`]: Plugin trait and ordered transform pipeline
//! - [`registry`]: Handler registry and handler replies
//! - [`pending`]: Pending-request table and correlation ids
//! - [`channel`]: Namespaced sub-channels
//! - [`transport`]: Transport capability trait
//! - [`config`]: Endpoint configuration
//! - [`error`]: Endpoint error types

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod pending;
pub mod pipeline;
pub mod registry;
pub mod transport;

pub use channel::SubChannel;
pub use config::{EndpointConfig, Origin};
pub use endpoint::{DropReason, Endpoint, EndpointStats, InboundOutcome, WeakEndpoint};
pub use error::{EndpointError, PipelineStage, PluginError, TransportError};
pub use framelink_proto::{Envelope, Payload, RequestId};
pub use handshake::{HandshakeError, HandshakeFuture, HandshakeState};
pub use pending::ResponseFuture;
pub use pipeline::Plugin;
pub use registry::{Handler, Reply};
pub use transport::{Delivery, Listener, SubscriptionId, Transport};
