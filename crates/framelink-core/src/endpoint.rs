//! Channel endpoint.
//!
//! The protocol engine: owns the transport binding, the handler registry,
//! the pending-request table, the plugin pipeline and the handshake machine.
//!
//! # Inbound
//!
//! Each delivery is processed synchronously:
//!
//! 1. Decode the frame and run the incoming pipeline
//! 2. Drop it if the reported origin fails the configured filter
//! 3. `handshake`: check the token, reply and complete on match
//! 4. `requestId` matching an in-flight request: resolve it (takes priority
//!    over type dispatch)
//! 5. Otherwise dispatch to the handler for the kind; if the message carried
//!    a `requestId`, send the handler's reply back as `<kind>:response`
//!
//! Messages with no handler are dropped silently.
//!
//! # Re-entrancy
//!
//! Handlers, plugin hooks and transport calls run with no internal borrow
//! held, so they may call back into the endpoint. Transports must queue
//! deliveries instead of invoking listeners from inside `post`.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    mem,
    rc::{Rc, Weak},
};

use framelink_proto::{Envelope, Payload, RequestId, kinds};
use futures::{
    channel::oneshot,
    task::{LocalSpawn, LocalSpawnExt},
};
use tracing::{debug, trace, warn};

use crate::{
    channel::SubChannel,
    config::{EndpointConfig, Origin},
    error::{EndpointError, PipelineStage},
    handshake::{HandshakeAction, HandshakeFuture, HandshakeMachine, HandshakeState},
    pending::{CorrelationIds, PendingRequests, ResponseFuture},
    pipeline::{Pipeline, Plugin},
    registry::{Handler, HandlerRegistry, Reply},
    transport::{Delivery, Listener, SubscriptionId, Transport},
};

/// Why an inbound message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Reported origin failed the filter
    OriginMismatch,
    /// No pending request and no handler for the kind
    UnhandledType,
    /// Endpoint was destroyed
    Destroyed,
}

/// What the endpoint did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Discarded without further processing
    Dropped(DropReason),
    /// Handshake token matched; reply sent and state completed
    HandshakeAccepted,
    /// Handshake token mismatched; state unchanged
    HandshakeRejected,
    /// Resolved an in-flight request
    Resolved,
    /// Handler invoked, no response owed
    Handled,
    /// Handler invoked and its response sent
    Responded,
    /// Handler invoked; its response is sent once the deferred reply completes
    Deferred,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Frames handed to the transport
    pub sent: u64,
    /// Frames delivered by the transport
    pub received: u64,
    /// Delivered frames discarded or aborted
    pub dropped: u64,
}

struct Inner {
    transport: Rc<dyn Transport>,
    config: EndpointConfig,
    subscription: Option<SubscriptionId>,
    handlers: HandlerRegistry,
    pending: PendingRequests,
    pipeline: Pipeline,
    handshake: HandshakeMachine,
    handshake_waiters: Vec<oneshot::Sender<()>>,
    handshake_listener: Option<Handler>,
    spawner: Option<Rc<dyn LocalSpawn>>,
    stats: EndpointStats,
    destroyed: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.transport.unsubscribe(subscription);
        }
    }
}

/// Handle to a channel endpoint.
///
/// Cloning is cheap and every clone refers to the same endpoint.
#[derive(Clone)]
pub struct Endpoint {
    inner: Rc<RefCell<Inner>>,
}

/// Non-owning handle to an endpoint.
#[derive(Clone)]
pub struct WeakEndpoint {
    inner: Weak<RefCell<Inner>>,
}

impl WeakEndpoint {
    /// Endpoint, if it is still alive.
    pub fn upgrade(&self) -> Option<Endpoint> {
        self.inner.upgrade().map(|inner| Endpoint { inner })
    }
}

impl fmt::Debug for WeakEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakEndpoint")
    }
}

impl Endpoint {
    /// Bind an endpoint to `transport` and subscribe to its deliveries.
    pub fn new(transport: Rc<dyn Transport>, config: EndpointConfig) -> Self {
        Self::with_correlation_ids(transport, config, CorrelationIds::new())
    }

    /// Like [`Endpoint::new`] with a caller-supplied id generator.
    pub fn with_correlation_ids(
        transport: Rc<dyn Transport>,
        config: EndpointConfig,
        ids: CorrelationIds,
    ) -> Self {
        let handshake = HandshakeMachine::new(config.handshake_token.clone());
        let endpoint = Self {
            inner: Rc::new(RefCell::new(Inner {
                transport: Rc::clone(&transport),
                config,
                subscription: None,
                handlers: HandlerRegistry::new(),
                pending: PendingRequests::with_ids(ids),
                pipeline: Pipeline::new(),
                handshake,
                handshake_waiters: Vec::new(),
                handshake_listener: None,
                spawner: None,
                stats: EndpointStats::default(),
                destroyed: false,
            })),
        };

        let weak = endpoint.downgrade();
        let listener: Listener = Rc::new(move |delivery: Delivery| {
            if let Some(endpoint) = weak.upgrade() {
                // Failures are logged by `receive`
                let _ = endpoint.receive(delivery);
            }
        });
        let subscription = transport.subscribe(listener);
        endpoint.inner.borrow_mut().subscription = Some(subscription);

        endpoint
    }

    /// Executor used to drive deferred handler replies.
    #[must_use]
    pub fn with_spawner(self, spawner: Rc<dyn LocalSpawn>) -> Self {
        self.inner.borrow_mut().spawner = Some(spawner);
        self
    }

    /// Non-owning handle, for plugins and callbacks that outlive a call.
    pub fn downgrade(&self) -> WeakEndpoint {
        WeakEndpoint { inner: Rc::downgrade(&self.inner) }
    }

    /// Register `handler` for `kind`, replacing any previous handler.
    ///
    /// Ignored after [`Endpoint::destroy`] and for an empty kind.
    pub fn on(&self, kind: &str, handler: Handler) {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            trace!(kind, "ignoring handler registration on destroyed endpoint");
            return;
        }
        if kind.is_empty() {
            warn!("ignoring handler registration for empty message type");
            return;
        }
        if kinds::is_reserved(kind) {
            // Inbound hellos never reach the registry
            warn!(kind, "handler registered for reserved message type");
        }

        let replaced = inner.handlers.insert(kind, handler).is_some();
        if inner.config.debug {
            debug!(kind, replaced, "handler registered");
        }
    }

    /// Remove the handler for `kind`.
    ///
    /// With `Some(handler)` the registration is only removed if it is that
    /// handler; otherwise this is a no-op.
    pub fn off(&self, kind: &str, handler: Option<&Handler>) {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.handlers.remove(kind, handler);
        if inner.config.debug {
            debug!(kind, removed, "handler removed");
        }
    }

    /// Send a fire-and-forget message.
    ///
    /// # Errors
    ///
    /// - `EmptyType` if `kind` is empty
    /// - `Destroyed` after [`Endpoint::destroy`]
    /// - `Pipeline` if an outgoing plugin hook failed
    /// - `Protocol`/`Transport` if encoding or posting failed
    pub fn send(&self, kind: &str, payload: impl Into<Option<Payload>>) -> Result<(), EndpointError> {
        if kind.is_empty() {
            return Err(EndpointError::EmptyType);
        }
        self.dispatch(Envelope::new(kind, payload.into()))
    }

    /// Send a request and return a future for its response payload.
    ///
    /// The future never resolves if no response arrives; wrap it in a
    /// timeout for bounded waiting.
    ///
    /// # Errors
    ///
    /// - `HandshakeIncomplete` if a handshake token is configured and the
    ///   handshake has not completed; nothing reaches the transport
    /// - any error of [`Endpoint::send`]; the pending entry is removed again
    pub fn request(
        &self,
        kind: &str,
        payload: impl Into<Option<Payload>>,
    ) -> Result<ResponseFuture, EndpointError> {
        if kind.is_empty() {
            return Err(EndpointError::EmptyType);
        }

        let response = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return Err(EndpointError::Destroyed);
            }
            if !inner.handshake.is_complete() {
                return Err(EndpointError::HandshakeIncomplete);
            }
            inner.pending.register()
        };

        let request_id = response.request_id().clone();
        let envelope = Envelope::request(kind, payload.into(), request_id.clone());
        if let Err(error) = self.dispatch(envelope) {
            self.inner.borrow_mut().pending.forget(&request_id);
            return Err(error);
        }

        Ok(response)
    }

    /// Run the handshake exchange from this side.
    ///
    /// Resolves immediately if no token is configured or the handshake
    /// already completed. Otherwise sends the token (once the transport is
    /// ready) and resolves when the peer echoes it back. Calling again while
    /// pending re-sends the token and joins the same exchange.
    ///
    /// # Errors
    ///
    /// - `Destroyed` if the endpoint was destroyed before the handshake
    ///   completed
    /// - `Pipeline`/`Protocol`/`Transport` if the token could not be sent
    ///   right away; this call's waiter is withdrawn
    ///
    /// A send deferred until the transport is ready can only fail later; that
    /// failure is logged and the future stays pending.
    pub fn handshake(&self) -> Result<HandshakeFuture, EndpointError> {
        let listener = self.handshake_listener();
        let (waiter, receiver) = oneshot::channel();

        let actions = {
            let mut inner = self.inner.borrow_mut();
            let actions = inner.handshake.initiate();
            if actions.contains(&HandshakeAction::Complete) {
                return Ok(HandshakeFuture::completed());
            }
            if inner.destroyed {
                return Err(EndpointError::Destroyed);
            }

            inner.handshake_waiters.push(waiter);
            let listener = inner.handshake_listener.get_or_insert(listener).clone();
            inner.handlers.insert(kinds::HANDSHAKE_RESPONSE, listener);
            if inner.config.debug {
                debug!(waiters = inner.handshake_waiters.len(), "handshake initiated");
            }
            actions
        };

        if let Err(error) = self.run_handshake_actions(actions) {
            warn!(%error, "handshake token not sent");
            self.withdraw_handshake_waiter(&receiver);
            return Err(error);
        }

        Ok(HandshakeFuture::waiting(receiver))
    }

    /// Namespaced facade over this endpoint.
    pub fn channel(&self, name: &str) -> SubChannel {
        SubChannel::new(self.clone(), name)
    }

    /// Append `plugin` to the pipeline and run its setup hook.
    ///
    /// Ignored after [`Endpoint::destroy`].
    pub fn use_plugin(&self, plugin: Rc<dyn Plugin>) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                trace!(plugin = plugin.name(), "ignoring plugin on destroyed endpoint");
                return;
            }
            inner.pipeline.push(Rc::clone(&plugin));
            if inner.config.debug {
                debug!(plugin = plugin.name(), position = inner.pipeline.len(), "plugin registered");
            }
        }

        plugin.setup(self);
    }

    /// Tear the endpoint down.
    ///
    /// Runs every plugin's teardown hook in registration order, detaches the
    /// transport subscription, and clears the handler registry and the
    /// pending-request table. Outstanding request and handshake futures are
    /// not settled: they stay pending forever. Idempotent.
    pub fn destroy(&self) {
        let (pipeline, transport, subscription) = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            (
                mem::take(&mut inner.pipeline),
                Rc::clone(&inner.transport),
                inner.subscription.take(),
            )
        };

        pipeline.teardown();
        if let Some(subscription) = subscription {
            transport.unsubscribe(subscription);
        }

        let mut inner = self.inner.borrow_mut();
        let abandoned = inner.pending.len();
        inner.handlers.clear();
        inner.pending.clear();
        inner.handshake_waiters.clear();
        inner.handshake_listener = None;
        if inner.config.debug {
            debug!(abandoned, "endpoint destroyed");
        }
    }

    /// Process one delivery from the transport.
    ///
    /// Called by the transport subscription; exposed so drivers can feed
    /// deliveries directly and observe the outcome.
    ///
    /// # Errors
    ///
    /// Decode failures, failing incoming plugin hooks, and failures sending a
    /// response. The message is aborted in every case and the error is
    /// logged. Deliveries from a rejected origin never error; they are
    /// dropped as [`DropReason::OriginMismatch`].
    pub fn receive(&self, delivery: Delivery) -> Result<InboundOutcome, EndpointError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return Ok(InboundOutcome::Dropped(DropReason::Destroyed));
            }
            inner.stats.received += 1;
        }

        let outcome = self.process(delivery);
        match &outcome {
            Ok(InboundOutcome::Dropped(_)) => self.inner.borrow_mut().stats.dropped += 1,
            Err(error) => {
                warn!(%error, "inbound message aborted");
                self.inner.borrow_mut().stats.dropped += 1;
            },
            Ok(_) => {},
        }
        outcome
    }

    /// Current handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.borrow().handshake.state()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: &str) -> bool {
        self.inner.borrow().handlers.contains(kind)
    }

    /// Whether [`Endpoint::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Configured origin filter.
    pub fn origin(&self) -> Origin {
        self.inner.borrow().config.origin.clone()
    }

    /// Traffic counters.
    pub fn stats(&self) -> EndpointStats {
        self.inner.borrow().stats
    }

    fn process(&self, delivery: Delivery) -> Result<InboundOutcome, EndpointError> {
        let (pipeline, filter, debug) = {
            let inner = self.inner.borrow();
            (inner.pipeline.clone(), inner.config.origin.clone(), inner.config.debug)
        };

        let foreign = !filter.accepts(&delivery.origin);
        let envelope = match Envelope::decode(&delivery.frame)
            .map_err(EndpointError::from)
            .and_then(|envelope| pipeline.apply(PipelineStage::AfterReceive, envelope))
        {
            Ok(envelope) => envelope,
            Err(error) if foreign => {
                trace!(
                    origin = %delivery.origin,
                    expected = %filter,
                    %error,
                    "dropping unreadable message from unexpected origin"
                );
                return Ok(InboundOutcome::Dropped(DropReason::OriginMismatch));
            },
            Err(error) => return Err(error),
        };

        if foreign {
            trace!(
                origin = %delivery.origin,
                expected = %filter,
                kind = %envelope.kind,
                "dropping message from unexpected origin"
            );
            return Ok(InboundOutcome::Dropped(DropReason::OriginMismatch));
        }

        if debug {
            debug!(
                kind = %envelope.kind,
                request_id = ?envelope.request_id,
                origin = %delivery.origin,
                "receive"
            );
        }

        let Envelope { kind, payload, request_id } = envelope;

        if kind == kinds::HANDSHAKE {
            return self.accept_handshake(payload.as_ref());
        }

        if let Some(request_id) = &request_id {
            let mut inner = self.inner.borrow_mut();
            if inner.pending.contains(request_id) {
                inner.pending.resolve(request_id, payload);
                return Ok(InboundOutcome::Resolved);
            }
        }

        let handler = self.inner.borrow().handlers.get(&kind);
        let Some(handler) = handler else {
            trace!(%kind, "no handler registered, dropping message");
            return Ok(InboundOutcome::Dropped(DropReason::UnhandledType));
        };

        let reply = handler.call(payload);
        match request_id {
            Some(request_id) => self.respond(&kind, request_id, reply),
            None => {
                if let Reply::Deferred(future) = reply {
                    self.spawn(&kind, async move {
                        future.await;
                    })?;
                }
                Ok(InboundOutcome::Handled)
            },
        }
    }

    fn respond(
        &self,
        kind: &str,
        request_id: RequestId,
        reply: Reply,
    ) -> Result<InboundOutcome, EndpointError> {
        let response_kind = kinds::response_kind(kind);

        match reply {
            Reply::Ready(payload) => {
                self.dispatch(Envelope::request(response_kind, payload, request_id))?;
                Ok(InboundOutcome::Responded)
            },
            Reply::Deferred(future) => {
                let weak = self.downgrade();
                self.spawn(kind, async move {
                    let payload = future.await;
                    let Some(endpoint) = weak.upgrade() else { return };
                    if endpoint.is_destroyed() {
                        return;
                    }
                    let response = Envelope::request(response_kind, payload, request_id);
                    if let Err(error) = endpoint.dispatch(response) {
                        warn!(%error, "deferred response not sent");
                    }
                })?;
                Ok(InboundOutcome::Deferred)
            },
        }
    }

    fn accept_handshake(&self, payload: Option<&Payload>) -> Result<InboundOutcome, EndpointError> {
        let result = self.inner.borrow_mut().handshake.handle_hello(payload);
        match result {
            Ok(actions) => {
                self.run_handshake_actions(actions)?;
                Ok(InboundOutcome::HandshakeAccepted)
            },
            Err(error) => {
                warn!(%error, "rejecting handshake");
                Ok(InboundOutcome::HandshakeRejected)
            },
        }
    }

    fn handshake_listener(&self) -> Handler {
        let weak = self.downgrade();
        Handler::new(move |payload: Option<Payload>| {
            if let Some(endpoint) = weak.upgrade() {
                endpoint.accept_handshake_reply(payload.as_ref());
            }
        })
    }

    fn accept_handshake_reply(&self, payload: Option<&Payload>) {
        let result = self.inner.borrow_mut().handshake.handle_reply(payload);
        match result {
            Ok(actions) => {
                if let Err(error) = self.run_handshake_actions(actions) {
                    warn!(%error, "handshake completion failed");
                }
            },
            Err(error) => warn!(%error, "ignoring handshake reply"),
        }
    }

    /// Runs every action even if a send fails, so a completed machine always
    /// settles its waiters. Returns the first send error.
    fn run_handshake_actions(&self, actions: Vec<HandshakeAction>) -> Result<(), EndpointError> {
        let mut first_error = None;
        for action in actions {
            match action {
                HandshakeAction::Send(envelope) => {
                    if let Err(error) = self.dispatch_when_ready(envelope) {
                        first_error.get_or_insert(error);
                    }
                },
                HandshakeAction::Complete => self.complete_handshake(),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drop the waiter paired with `receiver`. The reply listener goes with
    /// the last waiter.
    fn withdraw_handshake_waiter(&self, receiver: &oneshot::Receiver<()>) {
        let mut inner = self.inner.borrow_mut();
        inner.handshake_waiters.retain(|waiter| !waiter.is_connected_to(receiver));
        if inner.handshake_waiters.is_empty()
            && let Some(listener) = inner.handshake_listener.take()
        {
            inner.handlers.remove(kinds::HANDSHAKE_RESPONSE, Some(&listener));
        }
    }

    fn complete_handshake(&self) {
        let waiters = {
            let mut inner = self.inner.borrow_mut();
            if let Some(listener) = inner.handshake_listener.take() {
                inner.handlers.remove(kinds::HANDSHAKE_RESPONSE, Some(&listener));
            }
            if inner.config.debug {
                debug!(waiters = inner.handshake_waiters.len(), "handshake completed");
            }
            mem::take(&mut inner.handshake_waiters)
        };

        for waiter in waiters {
            // Caller may have dropped its future
            let _ = waiter.send(());
        }
    }

    fn dispatch_when_ready(&self, envelope: Envelope) -> Result<(), EndpointError> {
        let transport = Rc::clone(&self.inner.borrow().transport);
        if transport.is_ready() {
            return self.dispatch(envelope);
        }

        trace!(kind = %envelope.kind, "transport not ready, deferring send");
        let weak = self.downgrade();
        transport.when_ready(Box::new(move || {
            let Some(endpoint) = weak.upgrade() else { return };
            if let Err(error) = endpoint.dispatch(envelope) {
                warn!(%error, "deferred send failed");
            }
        }));
        Ok(())
    }

    fn dispatch(&self, envelope: Envelope) -> Result<(), EndpointError> {
        let (pipeline, transport, target, debug) = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return Err(EndpointError::Destroyed);
            }
            (
                inner.pipeline.clone(),
                Rc::clone(&inner.transport),
                inner.config.origin.clone(),
                inner.config.debug,
            )
        };

        let envelope = pipeline.apply(PipelineStage::BeforeSend, envelope)?;
        let frame = envelope.encode()?;

        if debug {
            debug!(
                kind = %envelope.kind,
                request_id = ?envelope.request_id,
                target = %target,
                size = frame.len(),
                "send"
            );
        }

        transport.post(frame, &target)?;
        self.inner.borrow_mut().stats.sent += 1;
        Ok(())
    }

    fn spawn(
        &self,
        kind: &str,
        future: impl Future<Output = ()> + 'static,
    ) -> Result<(), EndpointError> {
        let spawner = self.inner.borrow().spawner.clone();
        let no_spawner = || EndpointError::NoSpawner { kind: kind.to_owned() };

        spawner.ok_or_else(no_spawner)?.spawn_local(future).map_err(|_| no_spawner())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = self.inner.try_borrow() else {
            return f.write_str("Endpoint { <busy> }");
        };
        f.debug_struct("Endpoint")
            .field("origin", &inner.config.origin)
            .field("handshake", &inner.handshake.state())
            .field("handlers", &inner.handlers.len())
            .field("pending", &inner.pending.len())
            .field("plugins", &inner.pipeline)
            .field("destroyed", &inner.destroyed)
            .finish_non_exhaustive()
    }
}
