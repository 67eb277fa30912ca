//! Handshake state machine.
//!
//! An optional authorization exchange: both endpoints hold the same token,
//! and request-style calls stay blocked until the exchange has completed.
//! This is a token check, not cryptographic authentication.
//!
//! # Architecture: Action-Based State Machine
//!
//! The machine owns no I/O. Methods return [`HandshakeAction`]s and the
//! endpoint executes them (post an envelope, wake waiting callers).
//!
//! # State Machine
//!
//! ```text
//!  no token    ┌─────────────┐
//! ───────────> │ NotRequired │   (behaves as Completed)
//!              └─────────────┘
//!
//!  token       ┌─────────┐  handshake / handshake:response  ┌───────────┐
//! ───────────> │ Pending │ ───────── token matches ────────> │ Completed │
//!              └─────────┘                                   └───────────┘
//!                 │   ^
//!                 └───┘ token mismatch (reported, remote may retry)
//! ```
//!
//! `Completed` is terminal for the lifetime of the endpoint.
//!
//! # Exchange
//!
//! 1. Initiator sends `{type: "handshake", payload: token}`
//! 2. Responder compares the token, replies
//!    `{type: "handshake:response", payload: token}` and completes
//! 3. Initiator compares the echoed token and completes

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use framelink_proto::{Envelope, Payload, kinds};
use futures::{FutureExt, channel::oneshot};
use thiserror::Error;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No token configured; requests are never gated
    NotRequired,
    /// Token configured, exchange not acknowledged yet
    Pending,
    /// Exchange acknowledged
    Completed,
}

/// Effects requested by the handshake machine.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeAction {
    /// Post this envelope to the peer
    Send(Envelope),
    /// Handshake is complete; wake everyone waiting on it
    Complete,
}

/// Handshake failures. Reported locally, never sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Peer presented a token different from ours
    #[error("handshake token mismatch in {kind}")]
    TokenMismatch {
        /// Kind of the envelope that carried the token
        kind: &'static str,
    },
}

/// Handshake state machine.
#[derive(Debug, Clone)]
pub struct HandshakeMachine {
    state: HandshakeState,
    token: Option<String>,
}

impl HandshakeMachine {
    /// Machine in `Pending` if a token is configured, else `NotRequired`.
    pub fn new(token: Option<String>) -> Self {
        let state =
            if token.is_some() { HandshakeState::Pending } else { HandshakeState::NotRequired };
        Self { state, token }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether requests may proceed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, HandshakeState::NotRequired | HandshakeState::Completed)
    }

    /// Start (or restart) the exchange from our side.
    ///
    /// Already complete: `[Complete]`. Pending: `[Send(handshake)]`; calling
    /// again while pending re-sends the token.
    pub fn initiate(&mut self) -> Vec<HandshakeAction> {
        match (&self.token, self.is_complete()) {
            (Some(token), false) => {
                self.state = HandshakeState::Pending;
                vec![HandshakeAction::Send(Envelope::new(
                    kinds::HANDSHAKE,
                    Some(Payload::from(token.as_str())),
                ))]
            },
            _ => vec![HandshakeAction::Complete],
        }
    }

    /// Handle the peer's `handshake` envelope.
    ///
    /// # Errors
    ///
    /// `TokenMismatch` if the payload is not our token (or we have none). The
    /// state is left unchanged.
    pub fn handle_hello(
        &mut self,
        payload: Option<&Payload>,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let token = self.matching_token(payload, kinds::HANDSHAKE)?;
        let reply = Envelope::new(kinds::HANDSHAKE_RESPONSE, Some(Payload::from(token)));

        self.state = HandshakeState::Completed;
        Ok(vec![HandshakeAction::Send(reply), HandshakeAction::Complete])
    }

    /// Handle the peer's `handshake:response` envelope.
    ///
    /// # Errors
    ///
    /// `TokenMismatch` if the echoed token differs. The state is left
    /// unchanged and the exchange keeps waiting.
    pub fn handle_reply(
        &mut self,
        payload: Option<&Payload>,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        self.matching_token(payload, kinds::HANDSHAKE_RESPONSE)?;

        self.state = HandshakeState::Completed;
        Ok(vec![HandshakeAction::Complete])
    }

    fn matching_token(
        &self,
        payload: Option<&Payload>,
        kind: &'static str,
    ) -> Result<String, HandshakeError> {
        match (&self.token, payload.and_then(Payload::as_text)) {
            (Some(token), Some(received)) if token == received => Ok(token.clone()),
            _ => Err(HandshakeError::TokenMismatch { kind }),
        }
    }
}

/// Future resolved once the handshake completes.
///
/// Never resolves if the peer never acknowledges, or if the endpoint is
/// destroyed first.
#[derive(Debug)]
#[must_use = "the handshake outcome is only observable by polling the future"]
pub struct HandshakeFuture {
    waiter: Option<oneshot::Receiver<()>>,
}

impl HandshakeFuture {
    pub(crate) fn completed() -> Self {
        Self { waiter: None }
    }

    pub(crate) fn waiting(receiver: oneshot::Receiver<()>) -> Self {
        Self { waiter: Some(receiver) }
    }
}

impl Future for HandshakeFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.waiter.as_mut() {
            None => Poll::Ready(()),
            Some(receiver) => match receiver.poll_unpin(cx) {
                Poll::Ready(Ok(())) => Poll::Ready(()),
                Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
            },
        }
    }
}
