//! Request/response correlation between two simulated endpoints.

use std::{cell::RefCell, rc::Rc};

use framelink_core::{
    Endpoint, EndpointConfig, Envelope, Handler, Origin, Payload, Plugin, PluginError, Reply,
};
use framelink_harness::{NetworkConfig, SimNetwork, logging, scenario::World};
use futures::{FutureExt, channel::oneshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct GetUser {
    id: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

/// Records every inbound envelope after decoding.
#[derive(Default)]
struct WireTap {
    seen: RefCell<Vec<Envelope>>,
}

impl Plugin for WireTap {
    fn name(&self) -> &str {
        "wiretap"
    }

    fn after_receive(&self, envelope: &Envelope) -> Result<Option<Envelope>, PluginError> {
        self.seen.borrow_mut().push(envelope.clone());
        Ok(None)
    }
}

fn linked(config: NetworkConfig) -> (World, Endpoint, Endpoint) {
    logging::init_for_tests();
    let network = SimNetwork::new(config);
    let mut world = World::new(network.clone());
    let (parent, child) = network.link("parent", "child");
    world.add_actor("parent", parent, EndpointConfig::default().with_origin(Origin::parse("child")));
    world.add_actor("child", child, EndpointConfig::default().with_origin(Origin::parse("parent")));

    let parent = world.endpoint("parent").unwrap().clone();
    let child = world.endpoint("child").unwrap().clone();
    (world, parent, child)
}

#[test]
fn request_resolves_with_handler_result() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    let tap = Rc::new(WireTap::default());
    parent.use_plugin(tap.clone());

    child.on(
        "getUser",
        Handler::new(|payload: Option<Payload>| {
            let request: GetUser = payload.unwrap().decode().unwrap();
            assert_eq!(request, GetUser { id: 1 });
            Payload::encode(&User { name: "X".into() }).unwrap()
        }),
    );

    let response = parent.request("getUser", Payload::encode(&GetUser { id: 1 }).unwrap()).unwrap();
    let request_id = response.request_id().clone();
    world.run_until_idle();

    let payload = response.now_or_never().expect("response delivered").expect("payload present");
    assert_eq!(payload.decode::<User>().unwrap(), User { name: "X".into() });

    let seen = tap.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, "getUser:response");
    assert_eq!(seen[0].request_id, Some(request_id));
    assert_eq!(parent.pending_requests(), 0);
}

#[test]
fn handler_without_return_value_resolves_empty() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    child.on("ack", Handler::new(|_| ()));

    let response = parent.request("ack", None).unwrap();
    world.run_until_idle();

    assert_eq!(response.now_or_never(), Some(None));
}

#[test]
fn fire_and_forget_produces_no_response() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    let received = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&received);
    child.on(
        "notify",
        Handler::new(move |payload: Option<Payload>| {
            log.borrow_mut().push(payload);
            Payload::from("ignored")
        }),
    );

    parent.send("notify", Payload::from("hello")).unwrap();
    world.run_until_idle();

    assert_eq!(*received.borrow(), vec![Some(Payload::from("hello"))]);
    assert_eq!(world.frames_sent("child"), 0);
    assert_eq!(parent.stats().received, 0);
}

#[test]
fn unanswered_request_stays_pending() {
    let (mut world, parent, child) = linked(NetworkConfig::default());

    let response = parent.request("nobodyHome", None).unwrap();
    world.run_until_idle();

    assert_eq!(response.now_or_never(), None);
    assert_eq!(parent.pending_requests(), 1);
    assert_eq!(child.stats().dropped, 1);
}

#[test]
fn concurrent_requests_in_both_directions_do_not_cross() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    parent.on("whoami", Handler::new(|_| Payload::from("parent")));
    child.on("whoami", Handler::new(|_| Payload::from("child")));

    let from_parent: Vec<_> = (0..5).map(|_| parent.request("whoami", None).unwrap()).collect();
    let from_child: Vec<_> = (0..5).map(|_| child.request("whoami", None).unwrap()).collect();
    world.run_until_idle();

    for response in from_parent {
        assert_eq!(response.now_or_never(), Some(Some(Payload::from("child"))));
    }
    for response in from_child {
        assert_eq!(response.now_or_never(), Some(Some(Payload::from("parent"))));
    }
}

#[test]
fn deferred_handler_replies_once_ready() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    let (release, gate) = oneshot::channel::<u64>();
    let gate = RefCell::new(Some(gate));

    child.on(
        "slowSum",
        Handler::new(move |payload: Option<Payload>| {
            let base: u64 = payload.and_then(|p| p.decode().ok()).unwrap_or(0);
            let gate = gate.borrow_mut().take();
            Reply::deferred(async move {
                let extra = match gate {
                    Some(gate) => gate.await.unwrap_or(0),
                    None => 0,
                };
                Some(Payload::from(base + extra))
            })
        }),
    );

    let mut response = parent.request("slowSum", Payload::from(40_u64)).unwrap();
    world.run_until_idle();
    assert_eq!((&mut response).now_or_never(), None);
    assert_eq!(world.frames_sent("child"), 0);

    release.send(2).unwrap();
    world.run_until_idle();

    assert_eq!(response.now_or_never(), Some(Some(Payload::from(42_u64))));
    assert_eq!(world.frames_sent("child"), 1);
}

#[test]
fn namespaced_send_produces_prefixed_envelope() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    let tap = Rc::new(WireTap::default());
    child.use_plugin(tap.clone());

    parent.channel("auth").send("login", Payload::from("p")).unwrap();
    world.run_until_idle();

    assert_eq!(*tap.seen.borrow(), vec![Envelope::new("auth:login", Some(Payload::from("p")))]);
}

#[test]
fn namespaced_request_round_trip() {
    let (mut world, parent, child) = linked(NetworkConfig::default());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for namespace in ["auth", "billing"] {
        let log = Rc::clone(&seen);
        child.channel(namespace).on(
            "status",
            Handler::new(move |_| {
                log.borrow_mut().push(namespace);
                Payload::from(namespace)
            }),
        );
    }

    let response = parent.channel("billing").request("status", None).unwrap();
    world.run_until_idle();

    assert_eq!(response.now_or_never(), Some(Some(Payload::from("billing"))));
    assert_eq!(*seen.borrow(), vec!["billing"]);
}
