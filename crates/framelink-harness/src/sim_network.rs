//! In-memory simulated transport.
//!
//! A [`SimNetwork`] owns a single frame queue shared by every attached peer.
//! Posting a frame only enqueues it; nothing is delivered until the test
//! calls [`SimNetwork::deliver_next`], [`SimNetwork::deliver_all`] or
//! [`SimNetwork::run_until_idle`]. Listeners therefore never run inside
//! `post`, and every interleaving is chosen by the test.
//!
//! # Fault injection
//!
//! All randomness comes from a ChaCha RNG seeded by [`NetworkConfig::seed`],
//! so a failing run reproduces exactly from its seed.
//!
//! - Loss: each posted frame is discarded with probability `loss_rate`
//! - Reordering: each delivery picks a random queued frame instead of the
//!   oldest
//! - Readiness: a peer that is not ready loses everything it posts, like a
//!   host environment that has not finished loading. `set_ready(true)` runs
//!   the callbacks registered through `when_ready`.
//!
//! Addressing follows the host model: a frame posted with an exact target
//! origin is silently discarded unless the receiving peer has that origin.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use bytes::Bytes;
use framelink_core::{
    Delivery, Listener, Origin, SubscriptionId, Transport, TransportError,
    transport::ReadyCallback,
};
use futures::executor::LocalPool;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Upper bound on deliveries per drain, so chatty handlers cannot spin forever.
const MAX_DELIVERIES: usize = 100_000;

/// Fault-injection knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// RNG seed
    pub seed: u64,
    /// Probability in `[0, 1]` that a posted frame is lost
    pub loss_rate: f64,
    /// Deliver queued frames in random order
    pub reorder: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { seed: 0, loss_rate: 0.0, reorder: false }
    }
}

impl NetworkConfig {
    /// Set the RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the loss probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    /// Enable or disable reordering.
    #[must_use]
    pub fn with_reordering(mut self, reorder: bool) -> Self {
        self.reorder = reorder;
        self
    }
}

struct InFlight {
    to: usize,
    origin: String,
    frame: Bytes,
}

struct Peer {
    origin: String,
    remote: Option<usize>,
    listeners: Vec<(SubscriptionId, Listener)>,
    ready: bool,
    ready_callbacks: Vec<ReadyCallback>,
    sent: usize,
    received: usize,
}

impl Peer {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_owned(),
            remote: None,
            listeners: Vec::new(),
            ready: true,
            ready_callbacks: Vec::new(),
            sent: 0,
            received: 0,
        }
    }
}

struct State {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    peers: Vec<Peer>,
    queue: VecDeque<InFlight>,
    next_subscription: u64,
    lost: usize,
    misaddressed: usize,
}

impl State {
    fn add_peer(&mut self, origin: &str) -> usize {
        self.peers.push(Peer::new(origin));
        self.peers.len() - 1
    }
}

/// Shared queue connecting simulated peers.
#[derive(Clone)]
pub struct SimNetwork {
    state: Rc<RefCell<State>>,
}

impl SimNetwork {
    /// Create an empty network.
    pub fn new(config: NetworkConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            state: Rc::new(RefCell::new(State {
                config,
                rng,
                peers: Vec::new(),
                queue: VecDeque::new(),
                next_subscription: 0,
                lost: 0,
                misaddressed: 0,
            })),
        }
    }

    /// Create two peers that post to each other.
    pub fn link(&self, a: &str, b: &str) -> (SimTransport, SimTransport) {
        let mut state = self.state.borrow_mut();
        let a_id = state.add_peer(a);
        let b_id = state.add_peer(b);
        if let Some(peer) = state.peers.get_mut(a_id) {
            peer.remote = Some(b_id);
        }
        if let Some(peer) = state.peers.get_mut(b_id) {
            peer.remote = Some(a_id);
        }

        (self.transport(a_id), self.transport(b_id))
    }

    /// Create a peer at `origin` that posts to `target`.
    ///
    /// `target` keeps posting to its original remote.
    pub fn attach(&self, origin: &str, target: &SimTransport) -> SimTransport {
        let mut state = self.state.borrow_mut();
        let id = state.add_peer(origin);
        if let Some(peer) = state.peers.get_mut(id) {
            peer.remote = Some(target.peer);
        }
        self.transport(id)
    }

    /// Enqueue `frame` for `to`, reported as coming from `origin`.
    ///
    /// Bypasses loss, readiness and addressing.
    pub fn inject(&self, to: &SimTransport, origin: &str, frame: Bytes) {
        self.state.borrow_mut().queue.push_back(InFlight {
            to: to.peer,
            origin: origin.to_owned(),
            frame,
        });
    }

    /// Frames queued and not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Frames discarded by loss injection or an unready sender.
    pub fn frames_lost(&self) -> usize {
        self.state.borrow().lost
    }

    /// Frames discarded because the target origin did not match.
    pub fn frames_misaddressed(&self) -> usize {
        self.state.borrow().misaddressed
    }

    /// Deliver one queued frame. Returns `false` if the queue was empty.
    pub fn deliver_next(&self) -> bool {
        let next = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let index = if state.config.reorder && state.queue.len() > 1 {
                state.rng.gen_range(0..state.queue.len())
            } else {
                0
            };
            let Some(in_flight) = state.queue.remove(index) else {
                return false;
            };

            state.peers.get_mut(in_flight.to).map(|peer| {
                peer.received += 1;
                let listeners: Vec<Listener> =
                    peer.listeners.iter().map(|(_, listener)| Rc::clone(listener)).collect();
                (in_flight, listeners)
            })
        };

        if let Some((in_flight, listeners)) = next {
            trace!(origin = %in_flight.origin, size = in_flight.frame.len(), "deliver");
            for listener in listeners {
                listener(Delivery::new(in_flight.origin.clone(), in_flight.frame.clone()));
            }
        }
        true
    }

    /// Deliver until the queue is empty. Returns the number of deliveries.
    pub fn deliver_all(&self) -> usize {
        let mut delivered = 0;
        while delivered < MAX_DELIVERIES && self.deliver_next() {
            delivered += 1;
        }
        delivered
    }

    /// Alternate between delivering frames and running spawned tasks until
    /// neither makes progress. Returns the number of deliveries.
    pub fn run_until_idle(&self, pool: &mut LocalPool) -> usize {
        let mut delivered = 0;
        loop {
            pool.run_until_stalled();
            let batch = self.deliver_all();
            delivered += batch;
            if batch == 0 || delivered >= MAX_DELIVERIES {
                pool.run_until_stalled();
                if self.in_flight() == 0 || delivered >= MAX_DELIVERIES {
                    return delivered;
                }
            }
        }
    }

    fn transport(&self, peer: usize) -> SimTransport {
        SimTransport { state: Rc::clone(&self.state), peer }
    }
}

/// One peer's view of a [`SimNetwork`].
#[derive(Clone)]
pub struct SimTransport {
    state: Rc<RefCell<State>>,
    peer: usize,
}

impl SimTransport {
    /// Origin reported to whoever receives this peer's frames.
    pub fn origin(&self) -> String {
        self.with_peer(|peer| peer.origin.clone()).unwrap_or_default()
    }

    /// Frames this peer posted, including lost ones.
    pub fn frames_sent(&self) -> usize {
        self.with_peer(|peer| peer.sent).unwrap_or(0)
    }

    /// Frames delivered to this peer.
    pub fn frames_received(&self) -> usize {
        self.with_peer(|peer| peer.received).unwrap_or(0)
    }

    /// Active subscriptions.
    pub fn listener_count(&self) -> usize {
        self.with_peer(|peer| peer.listeners.len()).unwrap_or(0)
    }

    /// Mark the peer ready or not; becoming ready runs pending callbacks.
    pub fn set_ready(&self, ready: bool) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            let Some(peer) = state.peers.get_mut(self.peer) else {
                return;
            };
            peer.ready = ready;
            if ready { std::mem::take(&mut peer.ready_callbacks) } else { Vec::new() }
        };

        for callback in callbacks {
            callback();
        }
    }

    fn with_peer<T>(&self, f: impl FnOnce(&Peer) -> T) -> Option<T> {
        self.state.borrow().peers.get(self.peer).map(f)
    }
}

impl Transport for SimTransport {
    fn post(&self, frame: Bytes, target: &Origin) -> Result<(), TransportError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(peer) = state.peers.get_mut(self.peer) else {
            return Err(TransportError::Closed);
        };
        peer.sent += 1;

        if !peer.ready {
            trace!(origin = %peer.origin, "sender not ready, frame lost");
            state.lost += 1;
            return Ok(());
        }

        let origin = peer.origin.clone();
        let Some(to) = peer.remote else {
            return Err(TransportError::Closed);
        };
        let Some(receiver) = state.peers.get(to) else {
            return Err(TransportError::Closed);
        };

        if !target.accepts(&receiver.origin) {
            trace!(target = %target, receiver = %receiver.origin, "target origin mismatch, frame discarded");
            state.misaddressed += 1;
            return Ok(());
        }

        let loss_rate = state.config.loss_rate;
        if loss_rate > 0.0 && state.rng.gen_bool(loss_rate) {
            trace!(%origin, "frame lost");
            state.lost += 1;
            return Ok(());
        }

        state.queue.push_back(InFlight { to, origin, frame });
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        if let Some(peer) = state.peers.get_mut(self.peer) {
            peer.listeners.push((id, listener));
        }
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut state = self.state.borrow_mut();
        if let Some(peer) = state.peers.get_mut(self.peer) {
            peer.listeners.retain(|(id, _)| *id != subscription);
        }
    }

    fn is_ready(&self) -> bool {
        self.with_peer(|peer| peer.ready).unwrap_or(false)
    }

    fn when_ready(&self, callback: ReadyCallback) {
        let run_now = {
            let mut state = self.state.borrow_mut();
            match state.peers.get_mut(self.peer) {
                Some(peer) if !peer.ready => {
                    peer.ready_callbacks.push(callback);
                    None
                },
                _ => Some(callback),
            }
        };

        if let Some(callback) = run_now {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn collect(transport: &SimTransport) -> Rc<RefCell<Vec<Delivery>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        transport.subscribe(Rc::new(move |delivery| sink.borrow_mut().push(delivery)));
        seen
    }

    #[test]
    fn frames_wait_in_queue_until_delivered() {
        let network = SimNetwork::new(NetworkConfig::default());
        let (a, b) = network.link("a", "b");
        let seen = collect(&b);

        a.post(Bytes::from_static(b"one"), &Origin::Any).unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(network.in_flight(), 1);

        assert!(network.deliver_next());
        assert_eq!(*seen.borrow(), vec![Delivery::new("a", Bytes::from_static(b"one"))]);
        assert!(!network.deliver_next());
        assert_eq!((a.frames_sent(), b.frames_received()), (1, 1));
    }

    #[test]
    fn exact_target_must_match_receiver() {
        let network = SimNetwork::new(NetworkConfig::default());
        let (a, b) = network.link("a", "b");
        let seen = collect(&b);

        a.post(Bytes::new(), &Origin::parse("elsewhere")).unwrap();
        a.post(Bytes::new(), &Origin::parse("b")).unwrap();
        network.deliver_all();

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(network.frames_misaddressed(), 1);
    }

    #[test]
    fn unready_sender_loses_frames_and_defers_callbacks() {
        let network = SimNetwork::new(NetworkConfig::default());
        let (a, _b) = network.link("a", "b");
        a.set_ready(false);

        a.post(Bytes::new(), &Origin::Any).unwrap();
        assert_eq!(network.frames_lost(), 1);

        let fired = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&fired);
        a.when_ready(Box::new(move || *flag.borrow_mut() = true));
        assert!(!*fired.borrow());

        a.set_ready(true);
        assert!(*fired.borrow());
    }

    #[test]
    fn total_loss_drops_everything() {
        let network = SimNetwork::new(NetworkConfig::default().with_loss_rate(1.0));
        let (a, _b) = network.link("a", "b");

        for _ in 0..10 {
            a.post(Bytes::new(), &Origin::Any).unwrap();
        }
        assert_eq!(network.in_flight(), 0);
        assert_eq!(network.frames_lost(), 10);
    }

    #[test]
    fn reordering_is_reproducible_from_seed() {
        fn delivery_order(seed: u64) -> Vec<u8> {
            let config = NetworkConfig::default().with_seed(seed).with_reordering(true);
            let network = SimNetwork::new(config);
            let (a, b) = network.link("a", "b");
            let seen = collect(&b);
            for i in 0..16_u8 {
                a.post(Bytes::from(vec![i]), &Origin::Any).unwrap();
            }
            network.deliver_all();
            seen.borrow().iter().map(|d| d.frame[0]).collect()
        }

        let first = delivery_order(7);
        assert_eq!(first, delivery_order(7));

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let network = SimNetwork::new(NetworkConfig::default());
        let (a, b) = network.link("a", "b");
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        let id = b.subscribe(Rc::new(move |_| *counter.borrow_mut() += 1));

        b.unsubscribe(id);
        a.post(Bytes::new(), &Origin::Any).unwrap();
        network.deliver_all();

        assert_eq!(*seen.borrow(), 0);
        assert_eq!(b.listener_count(), 0);
    }
}
