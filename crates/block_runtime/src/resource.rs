//! Resource container
//!
//! A resource owns the block instances and connections of one deployable
//! unit, plus the event chains that execute them. All lifecycle operations
//! (create/delete, wire/unwire, inject) go through the resource; external
//! collaborators get a cloneable [`EngineHandle`](crate::EngineHandle)
//! instead of the resource itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use block_types::{InterfaceSpec, Value};
use serde::{Deserialize, Serialize};

use crate::block::{BlockIo, EventId, FunctionBlock};
use crate::chain::{
    ChainId, ChainReceiver, ChainSender, ChainState, Fault, Trigger, chain_channel, run_chain,
};
use crate::connection::{EventLink, InputLink, OutputCallback, PortRef};
use crate::error::{EngineError, EngineResult};
use crate::handler::EngineHandle;
use crate::registry::BlockRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Instances
// ─────────────────────────────────────────────────────────────────────────────

/// Algorithm state and port variables, serialized by the owning chain
pub(crate) struct InstanceCore {
    pub block: Box<dyn FunctionBlock>,
    pub io: BlockIo,
}

/// One block instance in the arena
///
/// The core is behind a mutex that is uncontended in steady state (all
/// triggers for an instance run on its one chain); it additionally
/// serializes wiring against a trigger in flight. Published output slots are
/// written only by the owning chain and copied by destinations.
pub(crate) struct Instance {
    pub id: String,
    pub type_name: String,
    pub interface: Arc<InterfaceSpec>,
    pub chain: ChainId,
    pub core: Mutex<InstanceCore>,
    /// Published value per data output, pulled by destinations
    pub published: Vec<Arc<RwLock<Value>>>,
    /// At most one data connection per data input
    pub input_links: Vec<RwLock<Option<InputLink>>>,
    /// Destinations per event output, in firing order
    pub event_links: Vec<RwLock<Vec<EventLink>>>,
    /// Output-change watchers per data output
    pub watches: Vec<RwLock<Vec<OutputCallback>>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

struct ChainSlot {
    sender: ChainSender,
    state: Arc<AtomicU8>,
}

/// Shared state between the resource and its chain workers
pub(crate) struct Network {
    instances: DashMap<String, Arc<Instance>>,
    chains: Vec<ChainSlot>,
    /// Triggers enqueued but not yet fully processed
    pending: AtomicUsize,
    drained: Notify,
    faults: broadcast::Sender<Fault>,
    next_chain: AtomicUsize,
}

impl Network {
    pub(crate) fn instance(&self, id: &str) -> Option<Arc<Instance>> {
        self.instances.get(id).map(|e| Arc::clone(e.value()))
    }

    pub(crate) fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub(crate) fn chain_state(&self, chain: ChainId) -> Option<ChainState> {
        self.chains
            .get(chain.0)
            .map(|slot| ChainState::from_u8(slot.state.load(Ordering::SeqCst)))
    }

    fn pick_chain(&self) -> ChainId {
        ChainId(self.next_chain.fetch_add(1, Ordering::Relaxed) % self.chains.len())
    }

    /// Push a trigger onto a chain's queue
    pub(crate) fn enqueue(&self, chain: ChainId, trigger: Trigger) -> EngineResult<()> {
        let slot = self
            .chains
            .get(chain.0)
            .ok_or(EngineError::UnknownChain(chain.0))?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        match slot.sender.try_send(chain, trigger) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.trigger_done();
                Err(err)
            }
        }
    }

    /// Mark one enqueued trigger as fully processed
    pub(crate) fn trigger_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub(crate) fn report_fault(&self, fault: Fault) {
        // no subscribers is fine; the warn log already happened at the site
        let _ = self.faults.send(fault);
    }

    pub(crate) fn subscribe_faults(&self) -> broadcast::Receiver<Fault> {
        self.faults.subscribe()
    }

    /// Start a chain by delivering an event to an instance's event input
    pub(crate) fn inject(&self, id: &str, event: EventId) -> EngineResult<()> {
        let instance = self
            .instance(id)
            .ok_or_else(|| EngineError::InstanceNotFound(id.to_string()))?;
        let count = instance.interface.event_input_count();
        if event >= count {
            return Err(EngineError::PortIndexOutOfRange {
                port: PortRef::new(id, event),
                count,
            });
        }
        self.enqueue(instance.chain, Trigger::new(id, event))
    }

    /// Read the published value of a data output
    pub(crate) fn read_output(&self, port: &PortRef) -> EngineResult<Value> {
        let instance = self
            .instance(&port.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(port.instance.clone()))?;
        let slot = instance
            .published
            .get(port.port)
            .ok_or_else(|| EngineError::PortIndexOutOfRange {
                port: port.clone(),
                count: instance.published.len(),
            })?;
        Ok(slot.read().clone())
    }

    /// Register a change watcher on a data output
    pub(crate) fn watch_output(
        &self,
        port: &PortRef,
        callback: OutputCallback,
    ) -> EngineResult<()> {
        let instance = self
            .instance(&port.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(port.instance.clone()))?;
        let cell = instance
            .watches
            .get(port.port)
            .ok_or_else(|| EngineError::PortIndexOutOfRange {
                port: port.clone(),
                count: instance.watches.len(),
            })?;
        cell.write().push(callback);
        Ok(())
    }

    /// Wait until every chain queue is drained and idle
    pub(crate) async fn quiesce(&self) {
        loop {
            let notified = self.drained.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chains Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Event-chain configuration for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Number of independent event chains (worker tasks)
    #[serde(default = "default_chains")]
    pub chains: usize,

    /// Trigger queue capacity per chain; unbounded when absent
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

fn default_chains() -> usize {
    1
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            queue_capacity: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource
// ─────────────────────────────────────────────────────────────────────────────

/// Container for one deployable unit of block instances and wiring
pub struct Resource {
    registry: Arc<BlockRegistry>,
    net: Arc<Network>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Resource {
    /// Create a resource and spawn its chain workers
    pub fn new(registry: Arc<BlockRegistry>, config: ChainsConfig) -> Self {
        let chain_count = config.chains.max(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (faults, _) = broadcast::channel(256);

        let mut slots = Vec::with_capacity(chain_count);
        let mut receivers: Vec<ChainReceiver> = Vec::with_capacity(chain_count);
        for _ in 0..chain_count {
            let (tx, rx) = chain_channel(config.queue_capacity);
            slots.push(ChainSlot {
                sender: tx,
                state: Arc::new(AtomicU8::new(ChainState::Idle as u8)),
            });
            receivers.push(rx);
        }

        let net = Arc::new(Network {
            instances: DashMap::new(),
            chains: slots,
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            faults,
            next_chain: AtomicUsize::new(0),
        });

        let workers = receivers
            .into_iter()
            .enumerate()
            .map(|(i, rx)| {
                let state = Arc::clone(&net.chains[i].state);
                let worker_net = Arc::clone(&net);
                let shutdown = shutdown_tx.subscribe();
                tokio::spawn(run_chain(ChainId(i), worker_net, rx, state, shutdown))
            })
            .collect();

        tracing::info!(chains = chain_count, "resource started");

        Self {
            registry,
            net,
            shutdown_tx,
            workers: Mutex::new(workers),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Set the join timeout used by [`shutdown`](Resource::shutdown)
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// A cloneable handle for external collaborators
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(Arc::clone(&self.net))
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Create an instance of a registered type, round-robined onto a chain
    pub fn create_instance(
        &self,
        type_name: &str,
        id: impl Into<String>,
    ) -> EngineResult<ChainId> {
        let chain = self.net.pick_chain();
        self.create_instance_on(type_name, id, chain)?;
        Ok(chain)
    }

    /// Create an instance bound to an explicit chain
    ///
    /// The binding is fixed for the instance's lifetime; it is what
    /// serializes all triggers for the instance.
    pub fn create_instance_on(
        &self,
        type_name: &str,
        id: impl Into<String>,
        chain: ChainId,
    ) -> EngineResult<()> {
        let id = id.into();
        if chain.0 >= self.net.chain_count() {
            return Err(EngineError::UnknownChain(chain.0));
        }
        if self.net.instances.contains_key(&id) {
            return Err(EngineError::DuplicateInstanceId(id));
        }

        let (interface, block) = self.registry.make(type_name)?;
        let io = BlockIo::from_interface(&interface);
        let published = interface
            .default_outputs()
            .into_iter()
            .map(|v| Arc::new(RwLock::new(v)))
            .collect();
        let input_links = (0..interface.data_input_count())
            .map(|_| RwLock::new(None))
            .collect();
        let event_links = (0..interface.event_output_count())
            .map(|_| RwLock::new(Vec::new()))
            .collect();
        let watches = (0..interface.data_output_count())
            .map(|_| RwLock::new(Vec::new()))
            .collect();

        tracing::debug!(instance = %id, type_name, %chain, "instance created");

        self.net.instances.insert(
            id.clone(),
            Arc::new(Instance {
                id,
                type_name: type_name.to_string(),
                interface,
                chain,
                core: Mutex::new(InstanceCore { block, io }),
                published,
                input_links,
                event_links,
                watches,
            }),
        );
        Ok(())
    }

    /// Delete an instance and cascade-disconnect everything touching it
    ///
    /// A trigger currently executing on the instance finishes first (it holds
    /// the instance through its chain); triggers still queued for the deleted
    /// id are discarded at dequeue.
    pub fn delete_instance(&self, id: &str) -> EngineResult<()> {
        self.net
            .instances
            .remove(id)
            .ok_or_else(|| EngineError::InstanceNotFound(id.to_string()))?;

        let others: Vec<Arc<Instance>> = self
            .net
            .instances
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for other in others {
            for cell in &other.input_links {
                let mut link = cell.write();
                if link.as_ref().is_some_and(|l| l.source.instance == id) {
                    *link = None;
                }
            }
            for cell in &other.event_links {
                cell.write().retain(|l| l.dest.instance != id);
            }
        }

        tracing::debug!(instance = %id, "instance deleted");
        Ok(())
    }

    /// Check if an instance exists
    pub fn contains(&self, id: &str) -> bool {
        self.net.instances.contains_key(id)
    }

    /// The registered type name of an instance
    pub fn type_of(&self, id: &str) -> Option<String> {
        self.net.instance(id).map(|i| i.type_name.clone())
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.net.instances.len()
    }

    /// Check if the resource has no instances
    pub fn is_empty(&self) -> bool {
        self.net.instances.is_empty()
    }

    // ── wiring ───────────────────────────────────────────────────────────────

    /// Connect a data output to a data input
    pub fn connect_data(&self, source: &PortRef, dest: &PortRef) -> EngineResult<()> {
        let src = self
            .net
            .instance(&source.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(source.instance.clone()))?;
        let dst = self
            .net
            .instance(&dest.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(dest.instance.clone()))?;

        let src_port = src.interface.data_out.get(source.port).ok_or_else(|| {
            EngineError::PortIndexOutOfRange {
                port: source.clone(),
                count: src.interface.data_output_count(),
            }
        })?;
        let dst_port = dst.interface.data_in.get(dest.port).ok_or_else(|| {
            EngineError::PortIndexOutOfRange {
                port: dest.clone(),
                count: dst.interface.data_input_count(),
            }
        })?;
        if src_port.kind != dst_port.kind {
            return Err(EngineError::TypeMismatch {
                src: source.clone(),
                dest: dest.clone(),
                source_kind: src_port.kind.clone(),
                dest_kind: dst_port.kind.clone(),
            });
        }

        let mut cell = dst.input_links[dest.port].write();
        if cell.is_some() {
            return Err(EngineError::AlreadyConnected(dest.clone()));
        }
        *cell = Some(InputLink {
            source: source.clone(),
            slot: Arc::clone(&src.published[source.port]),
        });
        Ok(())
    }

    /// Disconnect the data connection feeding a data input
    pub fn disconnect_data(&self, dest: &PortRef) -> EngineResult<()> {
        let dst = self
            .net
            .instance(&dest.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(dest.instance.clone()))?;
        let cell = dst.input_links.get(dest.port).ok_or_else(|| {
            EngineError::PortIndexOutOfRange {
                port: dest.clone(),
                count: dst.interface.data_input_count(),
            }
        })?;
        if cell.write().take().is_none() {
            return Err(EngineError::NotConnected(dest.clone()));
        }
        Ok(())
    }

    /// Check if a data input has an active connection
    pub fn is_connected(&self, dest: &PortRef) -> EngineResult<bool> {
        let dst = self
            .net
            .instance(&dest.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(dest.instance.clone()))?;
        let cell = dst.input_links.get(dest.port).ok_or_else(|| {
            EngineError::PortIndexOutOfRange {
                port: dest.clone(),
                count: dst.interface.data_input_count(),
            }
        })?;
        Ok(cell.read().is_some())
    }

    /// Connect an event output to an event input
    ///
    /// `with` overrides the data-input indices refreshed before the
    /// destination fires; the destination interface's with-list applies when
    /// absent. A destination event input may be fed by any number of distinct
    /// sources (logical OR), but the same source-destination pair only once.
    pub fn connect_event(
        &self,
        source: &PortRef,
        dest: &PortRef,
        with: Option<Vec<usize>>,
    ) -> EngineResult<()> {
        let src = self
            .net
            .instance(&source.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(source.instance.clone()))?;
        let dst = self
            .net
            .instance(&dest.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(dest.instance.clone()))?;

        if source.port >= src.interface.event_output_count() {
            return Err(EngineError::PortIndexOutOfRange {
                port: source.clone(),
                count: src.interface.event_output_count(),
            });
        }
        if dest.port >= dst.interface.event_input_count() {
            return Err(EngineError::PortIndexOutOfRange {
                port: dest.clone(),
                count: dst.interface.event_input_count(),
            });
        }
        if let Some(list) = &with {
            let count = dst.interface.data_input_count();
            for &idx in list {
                if idx >= count {
                    return Err(EngineError::PortIndexOutOfRange {
                        port: PortRef::new(dest.instance.clone(), idx),
                        count,
                    });
                }
            }
        }

        let mut links = src.event_links[source.port].write();
        if links.iter().any(|l| l.dest == *dest) {
            return Err(EngineError::AlreadyConnected(dest.clone()));
        }
        links.push(EventLink {
            dest: dest.clone(),
            with: with.map(Arc::new),
        });
        Ok(())
    }

    /// Disconnect one event connection
    pub fn disconnect_event(&self, source: &PortRef, dest: &PortRef) -> EngineResult<()> {
        let src = self
            .net
            .instance(&source.instance)
            .ok_or_else(|| EngineError::InstanceNotFound(source.instance.clone()))?;
        let cell = src.event_links.get(source.port).ok_or_else(|| {
            EngineError::PortIndexOutOfRange {
                port: source.clone(),
                count: src.interface.event_output_count(),
            }
        })?;
        let mut links = cell.write();
        let before = links.len();
        links.retain(|l| l.dest != *dest);
        if links.len() == before {
            return Err(EngineError::NotConnected(dest.clone()));
        }
        Ok(())
    }

    // ── execution ────────────────────────────────────────────────────────────

    /// Deliver an event to an instance's event input, starting a chain
    pub fn inject_event(&self, id: &str, event: EventId) -> EngineResult<()> {
        self.net.inject(id, event)
    }

    /// Read the published value of a data output
    pub fn read_output(&self, port: &PortRef) -> EngineResult<Value> {
        self.net.read_output(port)
    }

    /// Register a change watcher on a data output
    pub fn watch_output(&self, port: &PortRef, callback: OutputCallback) -> EngineResult<()> {
        self.net.watch_output(port, callback)
    }

    /// Subscribe to per-trigger faults
    pub fn faults(&self) -> broadcast::Receiver<Fault> {
        self.net.subscribe_faults()
    }

    /// Wait until all chains have drained their queues
    pub async fn quiesce(&self) {
        self.net.quiesce().await;
    }

    /// Number of event chains
    pub fn chain_count(&self) -> usize {
        self.net.chain_count()
    }

    /// Current state of one chain
    pub fn chain_state(&self, chain: ChainId) -> Option<ChainState> {
        self.net.chain_state(chain)
    }

    /// Signal shutdown and join all chain workers
    pub async fn shutdown(&self) -> EngineResult<()> {
        tracing::info!("shutting down resource");
        let _ = self.shutdown_tx.send(());

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = ?e, "chain worker panicked");
                }
                Err(_) => {
                    tracing::warn!("chain worker did not stop within timeout");
                    return Err(EngineError::ShutdownTimeout);
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{AlgorithmFault, FnBlock};
    use block_types::ValueKind;

    type Records = Arc<Mutex<Vec<i32>>>;
    type Labels = Arc<Mutex<Vec<String>>>;

    /// A block producing a fixed DINT on REQ and firing CNF
    fn register_source(registry: &mut BlockRegistry, name: &str, value: i32) {
        let interface = InterfaceSpec::new()
            .event_in("REQ", &[])
            .event_out("CNF", &[0])
            .data_out("OUT", ValueKind::Dint);
        registry
            .register(name, interface, move |iface| {
                Box::new(FnBlock::new(iface, move |_ev, io, events| {
                    io.set_output(0, Value::Dint(value))?;
                    events.fire(0);
                    Ok(())
                }))
            })
            .unwrap();
    }

    /// A terminal block recording its DINT input on every REQ
    fn register_probe(registry: &mut BlockRegistry, records: Records) {
        let interface = InterfaceSpec::new()
            .event_in("REQ", &[0])
            .data_in_with_default("IN", ValueKind::Dint, Value::Dint(7));
        registry
            .register("Probe", interface, move |iface| {
                let records = Arc::clone(&records);
                Box::new(FnBlock::new(iface, move |_ev, io, _events| {
                    records.lock().push(io.input_dint(0)?);
                    Ok(())
                }))
            })
            .unwrap();
    }

    /// A terminal block recording its own instance label on every REQ
    fn register_tag(registry: &mut BlockRegistry, labels: Labels, name: &str, label: &str) {
        let interface = InterfaceSpec::new().event_in("REQ", &[]);
        let label = label.to_string();
        registry
            .register(name, interface, move |iface| {
                let labels = Arc::clone(&labels);
                let label = label.clone();
                Box::new(FnBlock::new(iface, move |_ev, _io, _events| {
                    labels.lock().push(label.clone());
                    Ok(())
                }))
            })
            .unwrap();
    }

    fn single_chain(registry: BlockRegistry) -> Resource {
        Resource::new(Arc::new(registry), ChainsConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_duplicate() {
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 1);
        let resource = single_chain(registry);

        resource.create_instance("Source", "s1").unwrap();
        assert!(resource.contains("s1"));
        assert_eq!(resource.len(), 1);

        assert!(matches!(
            resource.create_instance("Source", "s1"),
            Err(EngineError::DuplicateInstanceId(_))
        ));
        assert!(matches!(
            resource.create_instance("Nope", "s2"),
            Err(EngineError::UnknownType(_))
        ));
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_value_copy_and_fan_out() {
        let records = Records::default();
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 42);
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("Source", "src").unwrap();
        for id in ["p1", "p2", "p3"] {
            resource.create_instance("Probe", id).unwrap();
            resource
                .connect_data(&PortRef::new("src", 0), &PortRef::new(id, 0))
                .unwrap();
            resource
                .connect_event(&PortRef::new("src", 0), &PortRef::new(id, 0), None)
                .unwrap();
        }

        resource.inject_event("src", 0).unwrap();
        resource.quiesce().await;

        assert_eq!(*records.lock(), vec![42, 42, 42]);
        assert_eq!(
            resource.read_output(&PortRef::new("src", 0)).unwrap(),
            Value::Dint(42)
        );
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unconnected_input_retains_default() {
        let records = Records::default();
        let mut registry = BlockRegistry::new();
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("Probe", "p").unwrap();
        resource.inject_event("p", 0).unwrap();
        resource.quiesce().await;

        assert_eq!(*records.lock(), vec![7]);
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_writer_invariant() {
        let records = Records::default();
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "SourceA", 1);
        register_source(&mut registry, "SourceB", 2);
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("SourceA", "a").unwrap();
        resource.create_instance("SourceB", "b").unwrap();
        resource.create_instance("Probe", "p").unwrap();

        resource
            .connect_data(&PortRef::new("a", 0), &PortRef::new("p", 0))
            .unwrap();
        let err = resource
            .connect_data(&PortRef::new("b", 0), &PortRef::new("p", 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyConnected(_)));

        // the original connection is intact: p still reads from a
        resource
            .connect_event(&PortRef::new("a", 0), &PortRef::new("p", 0), None)
            .unwrap();
        resource.inject_event("a", 0).unwrap();
        resource.quiesce().await;
        assert_eq!(*records.lock(), vec![1]);
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_type_mismatch_on_connect() {
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 1);
        let bool_in = InterfaceSpec::new()
            .event_in("REQ", &[0])
            .data_in("IN", ValueKind::Bool);
        registry
            .register("BoolSink", bool_in, |iface| {
                Box::new(FnBlock::new(iface, |_, _, _| Ok(())))
            })
            .unwrap();
        let resource = single_chain(registry);

        resource.create_instance("Source", "s").unwrap();
        resource.create_instance("BoolSink", "b").unwrap();
        let err = resource
            .connect_data(&PortRef::new("s", 0), &PortRef::new("b", 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_per_chain() {
        let labels = Labels::default();
        let mut registry = BlockRegistry::new();
        register_tag(&mut registry, Arc::clone(&labels), "TagA", "a");
        register_tag(&mut registry, Arc::clone(&labels), "TagB", "b");
        let resource = single_chain(registry);

        resource
            .create_instance_on("TagA", "a", ChainId(0))
            .unwrap();
        resource
            .create_instance_on("TagB", "b", ChainId(0))
            .unwrap();

        for _ in 0..10 {
            resource.inject_event("a", 0).unwrap();
            resource.inject_event("b", 0).unwrap();
        }
        resource.quiesce().await;

        let seen = labels.lock().clone();
        assert_eq!(seen.len(), 20);
        for pair in seen.chunks(2) {
            assert_eq!(pair, ["a", "b"]);
        }
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_with_override_skips_refresh() {
        let records = Records::default();
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 42);
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("Source", "s").unwrap();
        resource.create_instance("Probe", "p").unwrap();
        resource
            .connect_data(&PortRef::new("s", 0), &PortRef::new("p", 0))
            .unwrap();
        // empty override: nothing is refreshed, the probe keeps its default
        resource
            .connect_event(&PortRef::new("s", 0), &PortRef::new("p", 0), Some(vec![]))
            .unwrap();

        resource.inject_event("s", 0).unwrap();
        resource.quiesce().await;
        assert_eq!(*records.lock(), vec![7]);
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_semantics() {
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 1);
        let records = Records::default();
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("Source", "s").unwrap();
        resource.create_instance("Probe", "p").unwrap();

        let s_out = PortRef::new("s", 0);
        let p_in = PortRef::new("p", 0);
        assert!(matches!(
            resource.disconnect_data(&p_in),
            Err(EngineError::NotConnected(_))
        ));
        resource.connect_data(&s_out, &p_in).unwrap();
        assert!(resource.is_connected(&p_in).unwrap());
        resource.disconnect_data(&p_in).unwrap();
        assert!(!resource.is_connected(&p_in).unwrap());

        resource.connect_event(&s_out, &p_in, None).unwrap();
        assert!(matches!(
            resource.connect_event(&s_out, &p_in, None),
            Err(EngineError::AlreadyConnected(_))
        ));
        resource.disconnect_event(&s_out, &p_in).unwrap();
        assert!(matches!(
            resource.disconnect_event(&s_out, &p_in),
            Err(EngineError::NotConnected(_))
        ));
        resource.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deletion_deferred_past_running_trigger() {
        let records = Records::default();
        let mut registry = BlockRegistry::new();
        let slow_records = Arc::clone(&records);
        let interface = InterfaceSpec::new().event_in("REQ", &[]);
        registry
            .register("Slow", interface, move |iface| {
                let records = Arc::clone(&slow_records);
                Box::new(FnBlock::new(iface, move |_ev, _io, _events| {
                    std::thread::sleep(Duration::from_millis(50));
                    records.lock().push(1);
                    Ok(())
                }))
            })
            .unwrap();
        let resource = single_chain(registry);

        resource.create_instance("Slow", "slow").unwrap();
        resource.inject_event("slow", 0).unwrap();
        // second trigger queued behind the running one; discarded after delete
        resource.inject_event("slow", 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // delete while the first trigger is mid-execution
        resource.delete_instance("slow").unwrap();
        assert!(!resource.contains("slow"));

        resource.quiesce().await;
        // the in-flight trigger completed; the queued one was discarded
        assert_eq!(*records.lock(), vec![1]);
        assert!(matches!(
            resource.inject_event("slow", 0),
            Err(EngineError::InstanceNotFound(_))
        ));
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_cascades_disconnect() {
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 1);
        let records = Records::default();
        register_probe(&mut registry, Arc::clone(&records));
        let resource = single_chain(registry);

        resource.create_instance("Source", "s").unwrap();
        resource.create_instance("Probe", "p").unwrap();
        resource
            .connect_data(&PortRef::new("s", 0), &PortRef::new("p", 0))
            .unwrap();

        resource.delete_instance("s").unwrap();
        assert!(!resource.is_connected(&PortRef::new("p", 0)).unwrap());
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_sink_and_chain_survival() {
        let mut registry = BlockRegistry::new();
        let interface = InterfaceSpec::new().event_in("REQ", &[]);
        registry
            .register("Faulty", interface, |iface| {
                Box::new(FnBlock::new(iface, |_ev, _io, _events| {
                    Err(AlgorithmFault::msg("division by zero"))
                }))
            })
            .unwrap();
        let labels = Labels::default();
        register_tag(&mut registry, Arc::clone(&labels), "Tag", "ok");
        let resource = single_chain(registry);

        resource.create_instance("Faulty", "f").unwrap();
        resource.create_instance("Tag", "t").unwrap();

        let mut faults = resource.faults();
        resource.inject_event("f", 0).unwrap();
        resource.inject_event("t", 0).unwrap();
        resource.quiesce().await;

        let fault = faults.try_recv().unwrap();
        assert_eq!(fault.instance, "f");
        assert!(matches!(fault.kind, crate::chain::FaultKind::Algorithm(_)));
        // the chain kept going after the fault
        assert_eq!(*labels.lock(), vec!["ok"]);
        resource.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_queue_backpressure() {
        let mut registry = BlockRegistry::new();
        let interface = InterfaceSpec::new().event_in("REQ", &[]);
        registry
            .register("Slow", interface, |iface| {
                Box::new(FnBlock::new(iface, |_ev, _io, _events| {
                    std::thread::sleep(Duration::from_millis(100));
                    Ok(())
                }))
            })
            .unwrap();
        let resource = Resource::new(
            Arc::new(registry),
            ChainsConfig {
                chains: 1,
                queue_capacity: Some(1),
            },
        );

        resource.create_instance("Slow", "slow").unwrap();
        resource.inject_event("slow", 0).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // worker is busy with the first trigger; this one fills the queue
        resource.inject_event("slow", 0).unwrap();
        let err = resource.inject_event("slow", 0).unwrap_err();
        assert!(matches!(err, EngineError::ChainBackpressure(0)));

        resource.quiesce().await;
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_output_on_change_only() {
        let changes: Arc<Mutex<Vec<Value>>> = Arc::default();
        let mut registry = BlockRegistry::new();
        register_source(&mut registry, "Source", 42);
        let resource = single_chain(registry);

        resource.create_instance("Source", "s").unwrap();
        let sink = Arc::clone(&changes);
        resource
            .watch_output(
                &PortRef::new("s", 0),
                Arc::new(move |change| sink.lock().push(change.value.clone())),
            )
            .unwrap();

        resource.inject_event("s", 0).unwrap();
        resource.quiesce().await;
        // same value published again: no second notification
        resource.inject_event("s", 0).unwrap();
        resource.quiesce().await;

        assert_eq!(*changes.lock(), vec![Value::Dint(42)]);
        resource.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_terminates_chains() {
        let registry = BlockRegistry::new();
        let resource = single_chain(registry);
        resource.shutdown().await.unwrap();
        assert_eq!(
            resource.chain_state(ChainId(0)),
            Some(ChainState::Terminated)
        );
    }
}
