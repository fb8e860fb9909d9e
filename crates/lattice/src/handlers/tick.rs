//! Periodic tick handler
//!
//! Stands in for a timer device: injects configured events into the engine
//! on a fixed interval. The first injection happens immediately on enable.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use block_runtime::{
    EngineHandle, EngineResult, EventId, ExternalHandler, HandlerPriority,
};

/// Injects events into the engine on a fixed interval
pub struct TickHandler {
    name: String,
    interval: Duration,
    targets: Vec<(String, EventId)>,
    shutdown: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TickHandler {
    /// Create a tick handler with no targets
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            targets: Vec::new(),
            shutdown: None,
            task: None,
        }
    }

    /// Add an event to inject on every tick
    pub fn inject(mut self, instance: impl Into<String>, event: EventId) -> Self {
        self.targets.push((instance.into(), event));
        self
    }
}

#[async_trait]
impl ExternalHandler for TickHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> HandlerPriority {
        // timers come up before protocol adapters
        HandlerPriority::High
    }

    async fn enable(&mut self, engine: EngineHandle) -> EngineResult<()> {
        let (tx, mut rx) = broadcast::channel(1);
        let targets = self.targets.clone();
        let interval = self.interval;
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = ticker.tick() => {
                        for (instance, event) in &targets {
                            if let Err(e) = engine.inject_event(instance, *event) {
                                tracing::warn!(handler = %name, instance = %instance, error = %e, "tick injection failed");
                            }
                        }
                    }
                }
            }
        });

        self.shutdown = Some(tx);
        self.task = Some(task);
        Ok(())
    }

    async fn disable(&mut self) -> EngineResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(handler = %self.name, error = ?e, "tick task panicked");
            }
        }
        Ok(())
    }
}
