//! Plugin trait and ordered transform pipeline.
//!
//! Plugins see every envelope crossing the boundary, in both directions,
//! without the endpoint knowing what they do. Registration order is
//! execution order for both directions, and each stage receives the output
//! of the previous one.
//!
//! Hooks are synchronous. A failing hook aborts processing of that single
//! message: outbound, the error is returned to the caller of `send` or
//! `request`; inbound, the message is dropped and the error is logged and
//! returned from [`crate::Endpoint::receive`]. Later stages do not run.

use std::{fmt, rc::Rc};

use framelink_proto::Envelope;

use crate::{
    endpoint::Endpoint,
    error::{EndpointError, PipelineStage, PluginError},
};

/// Set of optional hooks applied around the transport.
///
/// Every hook has a no-op default, so a plugin only implements what it needs.
/// Transform hooks return `Ok(None)` to pass the envelope through unchanged.
/// Plugins that keep a handle to their endpoint should hold a
/// [`crate::WeakEndpoint`]; a strong handle creates a reference cycle.
pub trait Plugin {
    /// Name used in errors and diagnostics.
    fn name(&self) -> &str;

    /// Called once, synchronously, when the plugin is registered.
    fn setup(&self, _endpoint: &Endpoint) {}

    /// Transform an outgoing envelope.
    fn before_send(&self, _envelope: &Envelope) -> Result<Option<Envelope>, PluginError> {
        Ok(None)
    }

    /// Transform an incoming envelope, before it is classified.
    fn after_receive(&self, _envelope: &Envelope) -> Result<Option<Envelope>, PluginError> {
        Ok(None)
    }

    /// Called once when the endpoint is destroyed.
    fn teardown(&self) {}
}

/// Ordered, append-only plugin sequence.
#[derive(Clone, Default)]
pub struct Pipeline {
    plugins: Vec<Rc<dyn Plugin>>,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. It runs after every plugin already registered.
    pub fn push(&mut self, plugin: Rc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Plugins in registration order.
    pub fn plugins(&self) -> &[Rc<dyn Plugin>] {
        &self.plugins
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Thread `envelope` through every stage of one direction.
    ///
    /// # Errors
    ///
    /// `Pipeline` naming the first plugin whose hook failed.
    pub fn apply(&self, stage: PipelineStage, envelope: Envelope) -> Result<Envelope, EndpointError> {
        self.plugins.iter().try_fold(envelope, |envelope, plugin| {
            let transformed = match stage {
                PipelineStage::BeforeSend => plugin.before_send(&envelope),
                PipelineStage::AfterReceive => plugin.after_receive(&envelope),
            }
            .map_err(|source| EndpointError::Pipeline {
                plugin: plugin.name().to_owned(),
                stage,
                source,
            })?;

            Ok(transformed.unwrap_or(envelope))
        })
    }

    /// Run every teardown hook in registration order.
    pub fn teardown(&self) {
        for plugin in &self.plugins {
            plugin.teardown();
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.iter().map(|plugin| plugin.name())).finish()
    }
}
