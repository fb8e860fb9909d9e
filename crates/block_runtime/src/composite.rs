//! Composite function blocks
//!
//! A composite wraps a sub-network of typed blocks behind an ordinary block
//! interface. Events crossing the boundary map through the composite's own
//! port indices exactly as a leaf block would; the inner network runs to
//! completion on the calling chain through an explicit local FIFO, never
//! native call recursion.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use block_types::InterfaceSpec;

use crate::block::{AlgorithmFault, BlockIo, EventId, EventSink, FunctionBlock};
use crate::connection::PortRef;
use crate::error::{EngineError, EngineResult};
use crate::registry::{BlockFactory, BlockRegistry};

/// Inner triggers processed per boundary event before the composite
/// declares its network stuck
const MAX_INNER_STEPS: usize = 10_000;

// ─────────────────────────────────────────────────────────────────────────────
// Composite Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Declarative description of a composite type
///
/// Blocks and ports are named here for readability; everything resolves to
/// indices at registration time and instantiation can no longer fail.
#[derive(Debug, Clone, Default)]
pub struct CompositeSpec {
    interface: InterfaceSpec,
    blocks: Vec<(String, String)>,
    data: Vec<((String, String), (String, String))>,
    events: Vec<((String, String), (String, String))>,
    bind_event_in: Vec<(String, (String, String))>,
    bind_event_out: Vec<((String, String), String)>,
    bind_data_in: Vec<(String, (String, String))>,
    bind_data_out: Vec<((String, String), String)>,
}

impl CompositeSpec {
    /// Start a composite with its boundary interface
    pub fn new(interface: InterfaceSpec) -> Self {
        Self {
            interface,
            ..Default::default()
        }
    }

    /// Add an inner block instance of a registered type
    pub fn block(mut self, id: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.blocks.push((id.into(), type_name.into()));
        self
    }

    /// Connect an inner data output to an inner data input
    pub fn connect_data(
        mut self,
        src_block: impl Into<String>,
        src_port: impl Into<String>,
        dst_block: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> Self {
        self.data.push((
            (src_block.into(), src_port.into()),
            (dst_block.into(), dst_port.into()),
        ));
        self
    }

    /// Connect an inner event output to an inner event input
    pub fn connect_event(
        mut self,
        src_block: impl Into<String>,
        src_event: impl Into<String>,
        dst_block: impl Into<String>,
        dst_event: impl Into<String>,
    ) -> Self {
        self.events.push((
            (src_block.into(), src_event.into()),
            (dst_block.into(), dst_event.into()),
        ));
        self
    }

    /// Route a boundary event input to an inner event input
    pub fn bind_event_in(
        mut self,
        event: impl Into<String>,
        block: impl Into<String>,
        block_event: impl Into<String>,
    ) -> Self {
        self.bind_event_in
            .push((event.into(), (block.into(), block_event.into())));
        self
    }

    /// Route an inner event output to a boundary event output
    pub fn bind_event_out(
        mut self,
        block: impl Into<String>,
        block_event: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        self.bind_event_out
            .push(((block.into(), block_event.into()), event.into()));
        self
    }

    /// Route a boundary data input to an inner data input
    pub fn bind_data_in(
        mut self,
        port: impl Into<String>,
        block: impl Into<String>,
        block_port: impl Into<String>,
    ) -> Self {
        self.bind_data_in
            .push((port.into(), (block.into(), block_port.into())));
        self
    }

    /// Route an inner data output to a boundary data output
    pub fn bind_data_out(
        mut self,
        block: impl Into<String>,
        block_port: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        self.bind_data_out
            .push(((block.into(), block_port.into()), port.into()));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved Template
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct SubTemplate {
    pub interface: Arc<InterfaceSpec>,
    pub factory: BlockFactory,
}

/// Where an inner data input pulls from
#[derive(Debug, Clone, Copy)]
pub(crate) enum InnerSource {
    /// Another inner block's data output
    Sub(usize, usize),
    /// A boundary data input of the composite
    Boundary(usize),
}

/// A composite spec resolved against the registry
pub(crate) struct CompositeTemplate {
    pub interface: Arc<InterfaceSpec>,
    pub subs: Vec<SubTemplate>,
    /// Per sub, per data input: its single source
    pub input_links: Vec<Vec<Option<InnerSource>>>,
    /// Per sub, per event output: inner destinations in order
    pub event_links: Vec<Vec<Vec<(usize, usize)>>>,
    /// Per sub, per event output: bound boundary event output
    pub event_out_binds: Vec<Vec<Option<usize>>>,
    /// Per boundary event input: seeded inner triggers in order
    pub event_in_binds: Vec<Vec<(usize, usize)>>,
    /// Per boundary data output: the inner output it mirrors
    pub data_out_binds: Vec<Option<(usize, usize)>>,
}

impl CompositeTemplate {
    /// Resolve names to indices and capture sub-block factories
    pub(crate) fn resolve(
        spec: CompositeSpec,
        registry: &BlockRegistry,
    ) -> EngineResult<CompositeTemplate> {
        spec.interface.validate()?;
        let interface = Arc::new(spec.interface);

        let mut subs = Vec::with_capacity(spec.blocks.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for (id, type_name) in &spec.blocks {
            if index.contains_key(id) {
                return Err(EngineError::DuplicateInstanceId(id.clone()));
            }
            let (sub_interface, factory) = registry
                .entry(type_name)
                .ok_or_else(|| EngineError::UnknownType(type_name.clone()))?;
            index.insert(id.clone(), subs.len());
            subs.push(SubTemplate {
                interface: sub_interface,
                factory,
            });
        }

        let sub = |id: &str| -> EngineResult<usize> {
            index
                .get(id)
                .copied()
                .ok_or_else(|| EngineError::InstanceNotFound(id.to_string()))
        };
        let port = |instance: &str, name: &str, found: Option<usize>| -> EngineResult<usize> {
            found.ok_or_else(|| EngineError::UnknownPort {
                instance: instance.to_string(),
                name: name.to_string(),
            })
        };

        let mut input_links: Vec<Vec<Option<InnerSource>>> = subs
            .iter()
            .map(|s| vec![None; s.interface.data_input_count()])
            .collect();
        let mut event_links: Vec<Vec<Vec<(usize, usize)>>> = subs
            .iter()
            .map(|s| vec![Vec::new(); s.interface.event_output_count()])
            .collect();
        let mut event_out_binds: Vec<Vec<Option<usize>>> = subs
            .iter()
            .map(|s| vec![None; s.interface.event_output_count()])
            .collect();
        let mut event_in_binds: Vec<Vec<(usize, usize)>> =
            vec![Vec::new(); interface.event_input_count()];
        let mut data_out_binds: Vec<Option<(usize, usize)>> =
            vec![None; interface.data_output_count()];

        // inner data connections
        for ((src_id, src_port), (dst_id, dst_port)) in &spec.data {
            let s = sub(src_id)?;
            let d = sub(dst_id)?;
            let sp = port(src_id, src_port, subs[s].interface.data_output_index(src_port))?;
            let dp = port(dst_id, dst_port, subs[d].interface.data_input_index(dst_port))?;
            check_kinds(
                &subs[s].interface.data_out[sp].kind,
                &subs[d].interface.data_in[dp].kind,
                PortRef::new(src_id.clone(), sp),
                PortRef::new(dst_id.clone(), dp),
            )?;
            claim_input(&mut input_links[d][dp], InnerSource::Sub(s, sp), dst_id, dp)?;
        }

        // boundary data inputs
        for (name, (dst_id, dst_port)) in &spec.bind_data_in {
            let b = port("self", name, interface.data_input_index(name))?;
            let d = sub(dst_id)?;
            let dp = port(dst_id, dst_port, subs[d].interface.data_input_index(dst_port))?;
            check_kinds(
                &interface.data_in[b].kind,
                &subs[d].interface.data_in[dp].kind,
                PortRef::new("self", b),
                PortRef::new(dst_id.clone(), dp),
            )?;
            claim_input(&mut input_links[d][dp], InnerSource::Boundary(b), dst_id, dp)?;
        }

        // boundary data outputs
        for ((src_id, src_port), name) in &spec.bind_data_out {
            let s = sub(src_id)?;
            let sp = port(src_id, src_port, subs[s].interface.data_output_index(src_port))?;
            let b = port("self", name, interface.data_output_index(name))?;
            check_kinds(
                &subs[s].interface.data_out[sp].kind,
                &interface.data_out[b].kind,
                PortRef::new(src_id.clone(), sp),
                PortRef::new("self", b),
            )?;
            if data_out_binds[b].is_some() {
                return Err(EngineError::AlreadyConnected(PortRef::new("self", b)));
            }
            data_out_binds[b] = Some((s, sp));
        }

        // inner event connections
        for ((src_id, src_ev), (dst_id, dst_ev)) in &spec.events {
            let s = sub(src_id)?;
            let d = sub(dst_id)?;
            let se = port(src_id, src_ev, subs[s].interface.event_output_index(src_ev))?;
            let de = port(dst_id, dst_ev, subs[d].interface.event_input_index(dst_ev))?;
            event_links[s][se].push((d, de));
        }

        // boundary event routing
        for (name, (dst_id, dst_ev)) in &spec.bind_event_in {
            let b = port("self", name, interface.event_input_index(name))?;
            let d = sub(dst_id)?;
            let de = port(dst_id, dst_ev, subs[d].interface.event_input_index(dst_ev))?;
            event_in_binds[b].push((d, de));
        }
        for ((src_id, src_ev), name) in &spec.bind_event_out {
            let s = sub(src_id)?;
            let se = port(src_id, src_ev, subs[s].interface.event_output_index(src_ev))?;
            let b = port("self", name, interface.event_output_index(name))?;
            if event_out_binds[s][se].is_some() {
                return Err(EngineError::AlreadyConnected(PortRef::new(
                    src_id.clone(),
                    se,
                )));
            }
            event_out_binds[s][se] = Some(b);
        }

        Ok(CompositeTemplate {
            interface,
            subs,
            input_links,
            event_links,
            event_out_binds,
            event_in_binds,
            data_out_binds,
        })
    }
}

fn check_kinds(
    source_kind: &block_types::ValueKind,
    dest_kind: &block_types::ValueKind,
    source: PortRef,
    dest: PortRef,
) -> EngineResult<()> {
    if source_kind != dest_kind {
        return Err(EngineError::TypeMismatch {
            src: source,
            dest,
            source_kind: source_kind.clone(),
            dest_kind: dest_kind.clone(),
        });
    }
    Ok(())
}

fn claim_input(
    slot: &mut Option<InnerSource>,
    source: InnerSource,
    dst_id: &str,
    dst_port: usize,
) -> EngineResult<()> {
    if slot.is_some() {
        return Err(EngineError::AlreadyConnected(PortRef::new(
            dst_id.to_string(),
            dst_port,
        )));
    }
    *slot = Some(source);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Composite Instances
// ─────────────────────────────────────────────────────────────────────────────

struct SubInstance {
    block: Box<dyn FunctionBlock>,
    io: BlockIo,
}

/// A live composite: fresh inner instances over a shared template
pub(crate) struct CompositeBlock {
    template: Arc<CompositeTemplate>,
    subs: Vec<SubInstance>,
}

impl CompositeBlock {
    pub(crate) fn instantiate(template: Arc<CompositeTemplate>) -> Self {
        let subs = template
            .subs
            .iter()
            .map(|t| SubInstance {
                block: (t.factory)(),
                io: BlockIo::from_interface(&t.interface),
            })
            .collect();
        Self { template, subs }
    }
}

impl FunctionBlock for CompositeBlock {
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.template.interface)
    }

    fn execute(
        &mut self,
        event: EventId,
        io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        let template = Arc::clone(&self.template);
        let Some(seeds) = template.event_in_binds.get(event) else {
            return Ok(());
        };

        let mut queue: VecDeque<(usize, usize)> = seeds.iter().copied().collect();
        let mut steps = 0usize;

        while let Some((s, ev)) = queue.pop_front() {
            steps += 1;
            if steps > MAX_INNER_STEPS {
                return Err(AlgorithmFault::msg(
                    "inner event network did not settle; check for an event cycle",
                ));
            }

            // pull the with-listed inputs from their inner sources
            let with = template.subs[s].interface.events_in[ev].with.clone();
            for idx in with {
                match template.input_links[s][idx] {
                    Some(InnerSource::Sub(src, port)) => {
                        let value = self.subs[src].io.output(port)?.clone();
                        self.subs[s].io.refresh_input(idx, value);
                    }
                    Some(InnerSource::Boundary(b)) => {
                        let value = io.input(b)?.clone();
                        self.subs[s].io.refresh_input(idx, value);
                    }
                    None => {}
                }
            }

            let mut sink = EventSink::new();
            {
                let sub = &mut self.subs[s];
                sub.block.execute(ev, &mut sub.io, &mut sink)?;
            }

            for event_out in sink.take() {
                if event_out >= template.subs[s].interface.event_output_count() {
                    return Err(AlgorithmFault::msg(format!(
                        "inner block fired event output {event_out} out of range"
                    )));
                }
                for &(d, de) in &template.event_links[s][event_out] {
                    queue.push_back((d, de));
                }
                if let Some(boundary_event) = template.event_out_binds[s][event_out] {
                    // mirror the bound outputs named by the boundary event's
                    // with-list, then fire across the boundary
                    let with = template.interface.events_out[boundary_event].with.clone();
                    for idx in with {
                        if let Some((src, port)) = template.data_out_binds[idx] {
                            let value = self.subs[src].io.output(port)?.clone();
                            io.set_output(idx, value)?;
                        }
                    }
                    events.fire(boundary_event);
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
    use crate::block::FnBlock;
    use block_types::{Value, ValueKind};

    /// Register a block adding 1 to its DINT input on REQ, firing CNF
    fn register_inc(registry: &mut BlockRegistry) {
        let interface = InterfaceSpec::new()
            .event_in("REQ", &[0])
            .event_out("CNF", &[0])
            .data_in("IN", ValueKind::Dint)
            .data_out("OUT", ValueKind::Dint);
        registry
            .register("Inc", interface, |iface| {
                Box::new(FnBlock::new(iface, |_ev, io, events| {
                    let v = io.input_dint(0)?;
                    io.set_output(0, Value::Dint(v + 1))?;
                    events.fire(0);
                    Ok(())
                }))
            })
            .unwrap();
    }

    fn add_two_spec() -> CompositeSpec {
        let interface = InterfaceSpec::new()
            .event_in("REQ", &[0])
            .event_out("CNF", &[0])
            .data_in("IN", ValueKind::Dint)
            .data_out("OUT", ValueKind::Dint);
        CompositeSpec::new(interface)
            .block("first", "Inc")
            .block("second", "Inc")
            .bind_event_in("REQ", "first", "REQ")
            .bind_data_in("IN", "first", "IN")
            .connect_event("first", "CNF", "second", "REQ")
            .connect_data("first", "OUT", "second", "IN")
            .bind_event_out("second", "CNF", "CNF")
            .bind_data_out("second", "OUT", "OUT")
    }

    #[test]
    fn test_composite_runs_inner_network() {
        let mut registry = BlockRegistry::new();
        register_inc(&mut registry);
        registry.register_composite("AddTwo", add_two_spec()).unwrap();

        let (interface, mut block) = registry.make("AddTwo").unwrap();
        let mut io = BlockIo::from_interface(&interface);
        io.refresh_input(0, Value::Dint(40));

        let mut sink = EventSink::new();
        block.execute(0, &mut io, &mut sink).unwrap();

        assert_eq!(io.output_dint(0).unwrap(), 42);
        assert_eq!(sink.fired(), &[0]);
    }

    #[test]
    fn test_composite_instances_are_independent() {
        let mut registry = BlockRegistry::new();
        register_inc(&mut registry);
        registry.register_composite("AddTwo", add_two_spec()).unwrap();

        let (interface, mut a) = registry.make("AddTwo").unwrap();
        let (_, mut b) = registry.make("AddTwo").unwrap();

        let mut io_a = BlockIo::from_interface(&interface);
        let mut io_b = BlockIo::from_interface(&interface);
        io_a.refresh_input(0, Value::Dint(1));
        io_b.refresh_input(0, Value::Dint(100));

        let mut sink = EventSink::new();
        a.execute(0, &mut io_a, &mut sink).unwrap();
        let mut sink = EventSink::new();
        b.execute(0, &mut io_b, &mut sink).unwrap();

        assert_eq!(io_a.output_dint(0).unwrap(), 3);
        assert_eq!(io_b.output_dint(0).unwrap(), 102);
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = BlockRegistry::new();
        let spec = CompositeSpec::new(InterfaceSpec::new()).block("a", "Missing");
        assert!(matches!(
            CompositeTemplate::resolve(spec, &registry),
            Err(EngineError::UnknownType(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_port() {
        let mut registry = BlockRegistry::new();
        register_inc(&mut registry);
        let spec = CompositeSpec::new(InterfaceSpec::new())
            .block("a", "Inc")
            .block("b", "Inc")
            .connect_data("a", "NOPE", "b", "IN");
        assert!(matches!(
            CompositeTemplate::resolve(spec, &registry),
            Err(EngineError::UnknownPort { .. })
        ));
    }

    #[test]
    fn test_resolve_single_writer() {
        let mut registry = BlockRegistry::new();
        register_inc(&mut registry);
        let spec = CompositeSpec::new(InterfaceSpec::new())
            .block("a", "Inc")
            .block("b", "Inc")
            .block("c", "Inc")
            .connect_data("a", "OUT", "c", "IN")
            .connect_data("b", "OUT", "c", "IN");
        assert!(matches!(
            CompositeTemplate::resolve(spec, &registry),
            Err(EngineError::AlreadyConnected(_))
        ));
    }

    #[test]
    fn test_resolve_kind_mismatch() {
        let mut registry = BlockRegistry::new();
        register_inc(&mut registry);
        let interface = InterfaceSpec::new().data_in("IN", ValueKind::Bool);
        let spec = CompositeSpec::new(interface)
            .block("a", "Inc")
            .bind_data_in("IN", "a", "IN");
        assert!(matches!(
            CompositeTemplate::resolve(spec, &registry),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_event_cycle_is_a_fault() {
        let mut registry = BlockRegistry::new();
        let interface = InterfaceSpec::new()
            .event_in("REQ", &[])
            .event_out("CNF", &[]);
        registry
            .register("Echo", interface.clone(), |iface| {
                Box::new(FnBlock::new(iface, |_ev, _io, events| {
                    events.fire(0);
                    Ok(())
                }))
            })
            .unwrap();

        let spec = CompositeSpec::new(interface)
            .block("a", "Echo")
            .block("b", "Echo")
            .bind_event_in("REQ", "a", "REQ")
            .connect_event("a", "CNF", "b", "REQ")
            .connect_event("b", "CNF", "a", "REQ");
        registry.register_composite("Loop", spec).unwrap();

        let (iface, mut block) = registry.make("Loop").unwrap();
        let mut io = BlockIo::from_interface(&iface);
        let mut sink = EventSink::new();
        assert!(block.execute(0, &mut io, &mut sink).is_err());
    }
}
