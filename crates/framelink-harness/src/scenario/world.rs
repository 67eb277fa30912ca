//! World state for scenario execution.
//!
//! The World owns the simulated network, the executor driving deferred
//! replies, and every named endpoint with its transport.

use std::{collections::BTreeMap, rc::Rc};

use framelink_core::{Endpoint, EndpointConfig, HandshakeState, Transport};
use futures::executor::LocalPool;

use crate::sim_network::{SimNetwork, SimTransport};

struct Actor {
    endpoint: Endpoint,
    transport: SimTransport,
}

/// All actors of a running scenario.
pub struct World {
    network: SimNetwork,
    pool: LocalPool,
    actors: BTreeMap<String, Actor>,
}

impl World {
    /// Create a world over `network` with no actors.
    pub fn new(network: SimNetwork) -> Self {
        Self { network, pool: LocalPool::new(), actors: BTreeMap::new() }
    }

    /// Bind an endpoint to `transport` and register it under `name`.
    ///
    /// Returns `false` (and binds nothing) if the name is taken.
    pub fn add_actor(&mut self, name: &str, transport: SimTransport, config: EndpointConfig) -> bool {
        if self.actors.contains_key(name) {
            return false;
        }

        let endpoint = Endpoint::new(Rc::new(transport.clone()) as Rc<dyn Transport>, config)
            .with_spawner(Rc::new(self.pool.spawner()));
        self.actors.insert(name.to_owned(), Actor { endpoint, transport });
        true
    }

    /// Endpoint registered under `name`.
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.actors.get(name).map(|actor| &actor.endpoint)
    }

    /// Transport of the actor registered under `name`.
    pub fn transport(&self, name: &str) -> Option<&SimTransport> {
        self.actors.get(name).map(|actor| &actor.transport)
    }

    /// Underlying network.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Deliver frames and run spawned tasks until quiescent.
    pub fn run_until_idle(&mut self) -> usize {
        self.network.run_until_idle(&mut self.pool)
    }

    /// Frames posted by `name`.
    pub fn frames_sent(&self, name: &str) -> usize {
        self.transport(name).map_or(0, SimTransport::frames_sent)
    }

    /// Frames delivered to `name`.
    pub fn frames_received(&self, name: &str) -> usize {
        self.transport(name).map_or(0, SimTransport::frames_received)
    }

    /// Actor names in sorted order.
    pub fn actor_names(&self) -> Vec<String> {
        self.actors.keys().cloned().collect()
    }

    /// Whether every endpoint's handshake is complete or not required.
    pub fn all_handshakes_complete(&self) -> bool {
        self.actors.values().all(|actor| actor.endpoint.handshake_state() != HandshakeState::Pending)
    }
}
