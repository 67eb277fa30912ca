//! Handler registry.
//!
//! One handler per message kind. Registering again for the same kind
//! replaces the previous handler; there is no fan-out.

use std::{collections::HashMap, fmt, future::Future, rc::Rc};

use framelink_proto::Payload;
use futures::{FutureExt, future::LocalBoxFuture};

/// What a handler gives back for an inbound message.
///
/// The reply only matters when the inbound message was a request; for plain
/// sends it is discarded (deferred replies still run to completion).
pub enum Reply {
    /// Response payload available now (`None` sends a response without payload)
    Ready(Option<Payload>),
    /// Response payload produced asynchronously
    Deferred(LocalBoxFuture<'static, Option<Payload>>),
}

impl Reply {
    /// Reply without a payload.
    pub fn empty() -> Self {
        Self::Ready(None)
    }

    /// Reply once `future` completes.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Option<Payload>> + 'static,
    {
        Self::Deferred(future.boxed_local())
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(payload) => f.debug_tuple("Ready").field(payload).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Ready(None)
    }
}

impl From<Payload> for Reply {
    fn from(payload: Payload) -> Self {
        Self::Ready(Some(payload))
    }
}

impl From<Option<Payload>> for Reply {
    fn from(payload: Option<Payload>) -> Self {
        Self::Ready(payload)
    }
}

/// Message handler with identity.
///
/// Clones share identity, so the handle kept after [`crate::Endpoint::on`]
/// can later be passed to [`crate::Endpoint::off`].
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(Option<Payload>) -> Reply>);

impl Handler {
    /// Wrap a closure. Anything convertible into [`Reply`] may be returned.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(Option<Payload>) -> R + 'static,
        R: Into<Reply>,
    {
        Self(Rc::new(move |payload: Option<Payload>| -> Reply { f(payload).into() }))
    }

    /// Invoke the handler.
    pub fn call(&self, payload: Option<Payload>) -> Reply {
        (self.0)(payload)
    }

    /// Whether `self` and `other` are the same registration.
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
    }
}

/// Mapping from message kind to its single handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, returning the handler it replaced.
    pub fn insert(&mut self, kind: &str, handler: Handler) -> Option<Handler> {
        self.handlers.insert(kind.to_owned(), handler)
    }

    /// Remove the registration for `kind`.
    ///
    /// With `Some(handler)`, only removes it if it is the one registered.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, kind: &str, handler: Option<&Handler>) -> bool {
        match handler {
            Some(expected) => {
                let matches = self.handlers.get(kind).is_some_and(|current| current.same(expected));
                if matches {
                    self.handlers.remove(kind);
                }
                matches
            },
            None => self.handlers.remove(kind).is_some(),
        }
    }

    /// Handler registered for `kind`.
    pub fn get(&self, kind: &str) -> Option<Handler> {
        self.handlers.get(kind).cloned()
    }

    /// Whether a handler is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
