//! Deterministic simulation harness for Framelink endpoint testing.
//!
//! An in-memory, queue-based implementation of the `Transport` trait with
//! seeded fault injection, plus a scenario builder that drives endpoints to
//! quiescence and verifies the final state with a mandatory oracle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod scenario;
pub mod sim_network;

pub use sim_network::{NetworkConfig, SimNetwork, SimTransport};
