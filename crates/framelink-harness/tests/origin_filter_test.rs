//! Origin filtering on inbound messages and origin addressing on outbound ones.

use std::{cell::Cell, rc::Rc};

use bytes::Bytes;
use framelink_core::{
    Delivery, DropReason, Endpoint, EndpointConfig, Envelope, Handler, HandshakeState,
    InboundOutcome, Origin, Payload, Transport,
};
use framelink_harness::{NetworkConfig, SimNetwork, SimTransport, logging, scenario::World};

struct Setup {
    world: World,
    child: Endpoint,
    intruder: SimTransport,
    calls: Rc<Cell<usize>>,
}

/// Child filtered by `filter`, plus an intruder peer posting to the child.
fn setup(filter: Origin) -> Setup {
    logging::init_for_tests();
    let network = SimNetwork::new(NetworkConfig::default());
    let mut world = World::new(network.clone());
    let (parent, child) = network.link("https://parent.example", "https://child.example");
    let intruder = network.attach("https://intruder.example", &child);
    world.add_actor(
        "parent",
        parent,
        EndpointConfig::default().with_origin(Origin::parse("https://child.example")),
    );
    world.add_actor(
        "child",
        child,
        EndpointConfig::default().with_origin(filter).with_handshake_token("T"),
    );

    let child = world.endpoint("child").unwrap().clone();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    child.on("ping", Handler::new(move |_| counter.set(counter.get() + 1)));

    Setup { world, child, intruder, calls }
}

fn post(transport: &SimTransport, envelope: &Envelope) {
    transport.post(envelope.encode().unwrap(), &Origin::Any).unwrap();
}

#[test]
fn exact_filter_drops_foreign_origin() {
    let Setup { mut world, child, intruder, calls } = setup(Origin::parse("https://parent.example"));

    post(&intruder, &Envelope::new("ping", None));
    world.run_until_idle();
    assert_eq!(calls.get(), 0);
    assert_eq!(child.stats().dropped, 1);

    world.endpoint("parent").unwrap().send("ping", None).unwrap();
    world.run_until_idle();
    assert_eq!(calls.get(), 1);
}

#[test]
fn foreign_garbage_is_dropped_like_any_foreign_message() {
    let Setup { mut world, child, intruder, calls } = setup(Origin::parse("https://parent.example"));

    intruder.post(Bytes::from_static(b"hello"), &Origin::Any).unwrap();
    world.run_until_idle();
    assert_eq!(calls.get(), 0);
    assert_eq!(child.stats().dropped, 1);

    let outcome = child.receive(Delivery::new("https://intruder.example", Bytes::from_static(b"hello")));
    assert_eq!(outcome, Ok(InboundOutcome::Dropped(DropReason::OriginMismatch)));
}

#[test]
fn filter_requires_byte_equality() {
    let Setup { mut world, child, calls, .. } = setup(Origin::parse("https://parent.example"));
    let frame = Envelope::new("ping", None).encode().unwrap();

    for near_miss in ["https://parent.example/", "HTTPS://parent.example", "https://parent.example:443", ""] {
        world.network().inject(world.transport("child").unwrap(), near_miss, frame.clone());
    }
    world.run_until_idle();

    assert_eq!(calls.get(), 0);
    assert_eq!(child.stats().dropped, 4);
}

#[test]
fn foreign_handshake_is_ignored() {
    let Setup { mut world, child, intruder, .. } = setup(Origin::parse("https://parent.example"));

    post(&intruder, &Envelope::new("handshake", Some(Payload::from("T"))));
    world.run_until_idle();

    assert_eq!(child.handshake_state(), HandshakeState::Pending);
    assert_eq!(world.frames_sent("child"), 0);
}

#[test]
fn wildcard_accepts_any_origin() {
    let Setup { mut world, intruder, calls, .. } = setup(Origin::parse("*"));

    post(&intruder, &Envelope::new("ping", None));
    world.run_until_idle();

    assert_eq!(calls.get(), 1);
}

#[test]
fn outbound_frames_are_addressed_to_configured_origin() {
    logging::init_for_tests();
    let network = SimNetwork::new(NetworkConfig::default());
    let mut world = World::new(network.clone());
    let (parent, child) = network.link("https://parent.example", "https://child.example");
    world.add_actor(
        "parent",
        parent,
        EndpointConfig::default().with_origin(Origin::parse("https://elsewhere.example")),
    );
    world.add_actor("child", child, EndpointConfig::default());

    let received = Rc::new(Cell::new(false));
    let flag = Rc::clone(&received);
    world.endpoint("child").unwrap().on("ping", Handler::new(move |_| flag.set(true)));

    world.endpoint("parent").unwrap().send("ping", None).unwrap();
    world.run_until_idle();

    assert!(!received.get());
    assert_eq!(world.network().frames_misaddressed(), 1);
}
