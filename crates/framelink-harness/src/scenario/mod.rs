//! Scenario-based testing with mandatory oracles.
//!
//! A scenario declares linked peers, scripts steps against their endpoints,
//! and must end with an oracle that checks the final [`World`]. Between steps
//! the network and the executor run until idle, so each step observes a
//! quiescent world.
//!
//! ```text
//! Scenario::new(..) ─ link ─ handshake ─ step ─ step ─ oracle ─> RunnableScenario::run
//!                                 │         │      │
//!                                 └─ run_until_idle after each ─┘
//! ```

mod builder;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::World;

/// Final-state verification. Returns a description of the violation.
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;

/// Scripted action against the world.
pub type StepFn = Box<dyn FnOnce(&mut World) -> Result<(), String>>;

/// Reusable oracles.
pub mod oracle {
    use super::OracleFn;

    /// Every endpoint finished (or never needed) its handshake.
    pub fn all_handshakes_complete() -> OracleFn {
        Box::new(|world| {
            if world.all_handshakes_complete() {
                Ok(())
            } else {
                Err("not all endpoints completed their handshake".to_string())
            }
        })
    }

    /// No endpoint is waiting on a response.
    pub fn no_pending_requests() -> OracleFn {
        Box::new(|world| {
            let waiting: Vec<String> = world
                .actor_names()
                .into_iter()
                .filter(|name| world.endpoint(name).is_some_and(|e| e.pending_requests() > 0))
                .collect();
            if waiting.is_empty() {
                Ok(())
            } else {
                Err(format!("requests still pending on {}", waiting.join(", ")))
            }
        })
    }

    /// Nothing left in the network queue.
    pub fn network_drained() -> OracleFn {
        Box::new(|world| match world.network().in_flight() {
            0 => Ok(()),
            n => Err(format!("{n} frames still in flight")),
        })
    }

    /// Every oracle must pass; reports the first failure.
    pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
        Box::new(move |world| oracles.into_iter().try_for_each(|oracle| oracle(world)))
    }
}
