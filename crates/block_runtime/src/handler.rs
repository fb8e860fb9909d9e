//! External event handler boundary
//!
//! Communication adapters, timers, and other non-engine subsystems interact
//! with a resource exclusively through an [`EngineHandle`]: they inject
//! events into the network and watch published data outputs. Handlers are
//! managed objects with an enable/disable lifecycle; the handle is passed in
//! explicitly at enable time, never looked up through an ambient global.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use block_types::Value;

use crate::block::EventId;
use crate::chain::Fault;
use crate::connection::{OutputCallback, PortRef};
use crate::error::EngineResult;
use crate::resource::Network;

// ─────────────────────────────────────────────────────────────────────────────
// Engine Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable entry point into a resource for external collaborators
#[derive(Clone)]
pub struct EngineHandle {
    net: Arc<Network>,
}

impl EngineHandle {
    pub(crate) fn new(net: Arc<Network>) -> Self {
        Self { net }
    }

    /// Deliver an event to an instance's event input
    pub fn inject_event(&self, instance: &str, event: EventId) -> EngineResult<()> {
        self.net.inject(instance, event)
    }

    /// Read the published value of a data output
    pub fn read_output(&self, port: &PortRef) -> EngineResult<Value> {
        self.net.read_output(port)
    }

    /// Register a callback invoked when a data output's published value
    /// changes
    ///
    /// The callback runs on the chain worker mid-trigger; hand the change off
    /// (e.g. into a channel) instead of doing protocol work inline.
    pub fn watch_output(&self, port: &PortRef, callback: OutputCallback) -> EngineResult<()> {
        self.net.watch_output(port, callback)
    }

    /// Subscribe to per-trigger faults
    pub fn faults(&self) -> broadcast::Receiver<Fault> {
        self.net.subscribe_faults()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduling hint for handler enable order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum HandlerPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A non-engine subsystem that injects events and observes outputs
#[async_trait]
pub trait ExternalHandler: Send + 'static {
    /// Handler name for logs
    fn name(&self) -> &str;

    /// Enable-order hint; higher priorities enable first
    fn priority(&self) -> HandlerPriority {
        HandlerPriority::Normal
    }

    /// Start the handler with access to the engine
    async fn enable(&mut self, engine: EngineHandle) -> EngineResult<()>;

    /// Stop the handler and release its resources
    async fn disable(&mut self) -> EngineResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler Set
// ─────────────────────────────────────────────────────────────────────────────

/// The handlers attached to one resource
#[derive(Default)]
pub struct HandlerSet {
    handlers: Vec<Box<dyn ExternalHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler
    pub fn register(&mut self, handler: impl ExternalHandler) {
        self.handlers.push(Box::new(handler));
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Enable all handlers, highest priority first
    ///
    /// A handler that fails to enable is logged and skipped; the rest still
    /// come up.
    pub async fn enable_all(&mut self, engine: &EngineHandle) {
        self.handlers
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
        for handler in &mut self.handlers {
            match handler.enable(engine.clone()).await {
                Ok(()) => {
                    tracing::info!(handler = handler.name(), "handler enabled");
                }
                Err(e) => {
                    tracing::error!(handler = handler.name(), error = %e, "handler failed to enable");
                }
            }
        }
    }

    /// Disable all handlers, reverse enable order
    pub async fn disable_all(&mut self) {
        for handler in self.handlers.iter_mut().rev() {
            match handler.disable().await {
                Ok(()) => {
                    tracing::info!(handler = handler.name(), "handler disabled");
                }
                Err(e) => {
                    tracing::warn!(handler = handler.name(), error = %e, "handler failed to disable");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
