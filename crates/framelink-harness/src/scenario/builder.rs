//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use framelink_core::{EndpointConfig, Origin};

use crate::{
    scenario::{OracleFn, StepFn, World},
    sim_network::{NetworkConfig, SimNetwork},
};

struct Link {
    a: (String, EndpointConfig),
    b: (String, EndpointConfig),
}

/// Scenario builder.
///
/// Construct a scenario by linking peers and scripting steps. Must call
/// `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    network: NetworkConfig,
    links: Vec<Link>,
    steps: Vec<(String, StepFn)>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), network: NetworkConfig::default(), links: Vec::new(), steps: Vec::new() }
    }

    /// Fault-injection settings for the simulated network.
    pub fn network(mut self, config: NetworkConfig) -> Self {
        self.network = config;
        self
    }

    /// Link two peers; each accepts and addresses only the other's origin.
    ///
    /// Actor names double as origins.
    pub fn link(self, a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        let a_config = EndpointConfig::default().with_origin(Origin::parse(&b));
        let b_config = EndpointConfig::default().with_origin(Origin::parse(&a));
        self.link_with_config(a, a_config, b, b_config)
    }

    /// Link two peers with explicit endpoint configurations.
    pub fn link_with_config(
        mut self,
        a: impl Into<String>,
        a_config: EndpointConfig,
        b: impl Into<String>,
        b_config: EndpointConfig,
    ) -> Self {
        self.links.push(Link { a: (a.into(), a_config), b: (b.into(), b_config) });
        self
    }

    /// Start the handshake from `initiator`.
    pub fn handshake(self, initiator: impl Into<String>) -> Self {
        let initiator = initiator.into();
        let description = format!("{initiator} handshake");
        self.step(description, move |world| {
            let endpoint =
                world.endpoint(&initiator).ok_or_else(|| format!("unknown actor {initiator}"))?;
            // Completion is observed through the handshake state
            drop(endpoint.handshake().map_err(|e| e.to_string())?);
            Ok(())
        })
    }

    /// Run `step` against the world, then let it settle.
    pub fn step(
        mut self,
        description: impl Into<String>,
        step: impl FnOnce(&mut World) -> Result<(), String> + 'static,
    ) -> Self {
        self.steps.push((description.into(), Box::new(step)));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Link every declared pair on a fresh network and bind endpoints
    /// 2. Run each step in order, settling the world after each
    /// 3. Invoke the oracle on the final state
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, network, links, steps } = self.scenario;
        let network = SimNetwork::new(network);
        let mut world = World::new(network.clone());

        for Link { a: (a, a_config), b: (b, b_config) } in links {
            let (a_transport, b_transport) = network.link(&a, &b);
            for (actor, transport, config) in [(a, a_transport, a_config), (b, b_transport, b_config)] {
                if !world.add_actor(&actor, transport, config) {
                    return Err(format!("Scenario '{name}': duplicate actor {actor}"));
                }
            }
        }

        for (description, step) in steps {
            step(&mut world).map_err(|e| format!("Scenario '{name}': step '{description}' failed: {e}"))?;
            world.run_until_idle();
        }

        (self.oracle)(&world).map_err(|e| format!("Scenario '{name}': oracle failed: {e}"))
    }
}
