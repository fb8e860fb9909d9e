//! Event-chain execution workers
//!
//! Each chain owns one FIFO trigger queue drained by one worker task. A
//! dequeued trigger runs the full block protocol to completion (refresh the
//! with-listed inputs, execute, publish the with-listed outputs and forward
//! each fired event) before the next trigger starts. Cross-chain event
//! connections reduce to a thread-safe push onto the destination's queue and
//! are the only cross-chain interaction.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{broadcast, mpsc};

use crate::block::{AlgorithmFault, EventId, EventSink};
use crate::connection::{EventLink, OutputChange, PortRef};
use crate::error::{EngineError, EngineResult};
use crate::resource::Network;

// ─────────────────────────────────────────────────────────────────────────────
// Chain Identity & State
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of one event chain within a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub usize);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Current state of a chain worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChainState {
    /// Waiting on an empty queue
    Idle = 0,
    /// Executing a trigger
    Running = 1,
    /// Shutdown requested, worker winding down
    ShuttingDown = 2,
    /// Worker exited
    Terminated = 3,
}

impl ChainState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }

    /// Check if the worker has exited
    pub fn is_terminal(&self) -> bool {
        *self == ChainState::Terminated
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Idle => write!(f, "idle"),
            ChainState::Running => write!(f, "running"),
            ChainState::ShuttingDown => write!(f, "shutting-down"),
            ChainState::Terminated => write!(f, "terminated"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Triggers
// ─────────────────────────────────────────────────────────────────────────────

/// One pending event delivery: an instance and one of its event inputs
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Target instance id
    pub instance: String,
    /// Event input index on the target
    pub event: EventId,
    /// With-list override carried by the delivering event connection
    pub(crate) with: Option<Arc<Vec<usize>>>,
}

impl Trigger {
    /// A trigger using the target interface's declared with-list
    pub fn new(instance: impl Into<String>, event: EventId) -> Self {
        Self {
            instance: instance.into(),
            event,
            with: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Faults
// ─────────────────────────────────────────────────────────────────────────────

/// A per-trigger failure reported to the resource's fault sink
#[derive(Debug, Clone)]
pub struct Fault {
    /// Instance whose trigger faulted
    pub instance: String,
    /// Event input that was being processed
    pub event: EventId,
    pub kind: FaultKind,
}

/// What went wrong while processing a trigger
#[derive(Debug, Clone, thiserror::Error)]
pub enum FaultKind {
    #[error(transparent)]
    Algorithm(AlgorithmFault),

    #[error("fired event output {0} out of range")]
    BadOutputEvent(EventId),

    #[error("{chain} full, dropped event to {dest}")]
    Backpressure { chain: ChainId, dest: PortRef },
}

// ─────────────────────────────────────────────────────────────────────────────
// Chain Queues
// ─────────────────────────────────────────────────────────────────────────────

/// Sending half of a chain's trigger queue
pub(crate) enum ChainSender {
    Bounded(mpsc::Sender<Trigger>),
    Unbounded(mpsc::UnboundedSender<Trigger>),
}

impl ChainSender {
    /// Push a trigger without blocking
    ///
    /// A full bounded queue yields `ChainBackpressure`; blocking here would
    /// stall the enqueuing chain and is never acceptable mid-trigger.
    pub fn try_send(&self, chain: ChainId, trigger: Trigger) -> EngineResult<()> {
        match self {
            ChainSender::Bounded(tx) => tx.try_send(trigger).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::ChainBackpressure(chain.0),
                mpsc::error::TrySendError::Closed(_) => EngineError::ChannelClosed,
            }),
            ChainSender::Unbounded(tx) => {
                tx.send(trigger).map_err(|_| EngineError::ChannelClosed)
            }
        }
    }
}

/// Receiving half of a chain's trigger queue
pub(crate) enum ChainReceiver {
    Bounded(mpsc::Receiver<Trigger>),
    Unbounded(mpsc::UnboundedReceiver<Trigger>),
}

impl ChainReceiver {
    pub async fn recv(&mut self) -> Option<Trigger> {
        match self {
            ChainReceiver::Bounded(rx) => rx.recv().await,
            ChainReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Create a chain queue, bounded when a capacity is configured
pub(crate) fn chain_channel(capacity: Option<usize>) -> (ChainSender, ChainReceiver) {
    match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (ChainSender::Bounded(tx), ChainReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (ChainSender::Unbounded(tx), ChainReceiver::Unbounded(rx))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Run one chain worker until shutdown
pub(crate) async fn run_chain(
    chain: ChainId,
    net: Arc<Network>,
    mut rx: ChainReceiver,
    state: Arc<AtomicU8>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::debug!(%chain, "chain worker started");

    loop {
        state.store(ChainState::Idle as u8, Ordering::SeqCst);
        tokio::select! {
            _ = shutdown.recv() => break,
            trigger = rx.recv() => {
                let Some(trigger) = trigger else { break };
                state.store(ChainState::Running as u8, Ordering::SeqCst);
                run_trigger(&net, chain, &trigger);
                net.trigger_done();
            }
        }
    }

    state.store(ChainState::ShuttingDown as u8, Ordering::SeqCst);
    tracing::debug!(%chain, "chain worker stopped");
    state.store(ChainState::Terminated as u8, Ordering::SeqCst);
}

/// Execute one trigger's full protocol: read inputs, run the algorithm,
/// then publish data and forward events in firing order
fn run_trigger(net: &Network, chain: ChainId, trigger: &Trigger) {
    let Some(instance) = net.instance(&trigger.instance) else {
        // deleted after the trigger was queued; the event is consumed
        tracing::debug!(%chain, instance = %trigger.instance, "discarding trigger for deleted instance");
        return;
    };
    let spec = Arc::clone(&instance.interface);
    let Some(event_in) = spec.events_in.get(trigger.event) else {
        tracing::warn!(%chain, instance = %instance.id, event = trigger.event, "trigger event out of range");
        return;
    };

    let mut core = instance.core.lock();
    let core = &mut *core;

    // read_input_data: pull the with-listed inputs across their connections;
    // unconnected inputs keep their prior value
    let with: &[usize] = trigger
        .with
        .as_ref()
        .map(|w| w.as_slice())
        .unwrap_or(&event_in.with);
    for &idx in with {
        let Some(cell) = instance.input_links.get(idx) else {
            continue;
        };
        let slot = cell.read().as_ref().map(|link| Arc::clone(&link.slot));
        if let Some(slot) = slot {
            let value = slot.read().clone();
            core.io.refresh_input(idx, value);
        }
    }

    // execute_event
    let mut sink = EventSink::new();
    if let Err(fault) = core.block.execute(trigger.event, &mut core.io, &mut sink) {
        tracing::warn!(%chain, instance = %instance.id, event = trigger.event, error = %fault, "algorithm fault");
        net.report_fault(Fault {
            instance: instance.id.clone(),
            event: trigger.event,
            kind: FaultKind::Algorithm(fault),
        });
        return;
    }

    for event_out in sink.take() {
        let Some(ev) = spec.events_out.get(event_out) else {
            tracing::warn!(%chain, instance = %instance.id, event_out, "fired event output out of range");
            net.report_fault(Fault {
                instance: instance.id.clone(),
                event: trigger.event,
                kind: FaultKind::BadOutputEvent(event_out),
            });
            continue;
        };

        // write_output_data: publish the with-listed outputs; destinations
        // pull them on their own next read
        for &idx in &ev.with {
            let Some(value) = core.io.output_raw(idx) else {
                continue;
            };
            let slot = &instance.published[idx];
            if *slot.read() == *value {
                continue;
            }
            let value = value.clone();
            *slot.write() = value.clone();

            let watches = instance.watches[idx].read();
            if !watches.is_empty() {
                let change = OutputChange {
                    instance: instance.id.clone(),
                    port: idx,
                    value,
                };
                for callback in watches.iter() {
                    callback(&change);
                }
            }
        }

        // send_output_event: one trigger per destination, in destination order
        let links: Vec<EventLink> = instance.event_links[event_out].read().clone();
        for link in links {
            let Some(dest) = net.instance(&link.dest.instance) else {
                tracing::debug!(%chain, dest = %link.dest, "dropping event to deleted instance");
                continue;
            };
            let forwarded = Trigger {
                instance: link.dest.instance.clone(),
                event: link.dest.port,
                with: link.with.clone(),
            };
            if let Err(err) = net.enqueue(dest.chain, forwarded) {
                tracing::warn!(%chain, dest = %link.dest, error = %err, "dropping event");
                net.report_fault(Fault {
                    instance: instance.id.clone(),
                    event: trigger.event,
                    kind: FaultKind::Backpressure {
                        chain: dest.chain,
                        dest: link.dest.clone(),
                    },
                });
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
