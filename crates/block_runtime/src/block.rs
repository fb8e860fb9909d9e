//! Function-block contract
//!
//! Every block type implements [`FunctionBlock`]: a static interface plus a
//! synchronous `execute` for each event input. The engine owns the
//! surrounding protocol: it refreshes the with-listed inputs before
//! `execute`, then publishes the with-listed outputs and forwards each fired
//! output event, in firing order, after it.

use std::sync::Arc;

use block_types::{InterfaceSpec, Value, ValueError};

/// Index of an event port, stable per block type
pub type EventId = usize;

/// Index of a data port, stable per block type
pub type PortId = usize;

// ─────────────────────────────────────────────────────────────────────────────
// Algorithm Faults
// ─────────────────────────────────────────────────────────────────────────────

/// Declared failure raised by a block's own algorithm
///
/// Faults are caught at the chain level and reported to the resource's fault
/// sink; they consume the triggering event and never terminate the chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlgorithmFault {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("{0}")]
    Message(String),
}

impl AlgorithmFault {
    /// Create a fault from a message
    pub fn msg(message: impl Into<String>) -> Self {
        AlgorithmFault::Message(message.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block I/O
// ─────────────────────────────────────────────────────────────────────────────

/// Port variables of one block instance
///
/// Inputs hold the last values pulled across data connections (or their
/// declared defaults when unconnected); outputs hold what the algorithm wrote
/// and are published per the firing event's with-list.
pub struct BlockIo {
    inputs: Vec<Value>,
    outputs: Vec<Value>,
}

impl BlockIo {
    /// Create port variables initialized from the interface's defaults
    pub fn from_interface(spec: &InterfaceSpec) -> Self {
        Self {
            inputs: spec.default_inputs(),
            outputs: spec.default_outputs(),
        }
    }

    /// Read an input port variable
    pub fn input(&self, index: PortId) -> Result<&Value, AlgorithmFault> {
        self.inputs
            .get(index)
            .ok_or_else(|| out_of_range(index, self.inputs.len()))
    }

    /// Read an output port variable
    pub fn output(&self, index: PortId) -> Result<&Value, AlgorithmFault> {
        self.outputs
            .get(index)
            .ok_or_else(|| out_of_range(index, self.outputs.len()))
    }

    /// Write an output port variable, kind-checked against its declaration
    pub fn set_output(&mut self, index: PortId, value: impl Into<Value>) -> Result<(), AlgorithmFault> {
        let len = self.outputs.len();
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        slot.assign(&value.into())?;
        Ok(())
    }

    /// Write an input port variable, kind-checked against its declaration
    ///
    /// Inputs are normally refreshed by the engine across data connections;
    /// this is the introspection path for tooling and tests.
    pub fn set_input(&mut self, index: PortId, value: impl Into<Value>) -> Result<(), AlgorithmFault> {
        let len = self.inputs.len();
        let slot = self
            .inputs
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        slot.assign(&value.into())?;
        Ok(())
    }

    /// Mutable access to an input port variable
    pub fn input_mut(&mut self, index: PortId) -> Result<&mut Value, AlgorithmFault> {
        let len = self.inputs.len();
        self.inputs
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))
    }

    /// Mutable access to an output port variable
    pub fn output_mut(&mut self, index: PortId) -> Result<&mut Value, AlgorithmFault> {
        let len = self.outputs.len();
        self.outputs
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))
    }

    /// Input as boolean
    pub fn input_bool(&self, index: PortId) -> Result<bool, AlgorithmFault> {
        let v = self.input(index)?;
        v.as_bool()
            .ok_or_else(|| AlgorithmFault::msg(format!("input {index} is {}, not BOOL", v.kind())))
    }

    /// Input as DINT
    pub fn input_dint(&self, index: PortId) -> Result<i32, AlgorithmFault> {
        match self.input(index)? {
            Value::Dint(v) => Ok(*v),
            other => Err(AlgorithmFault::msg(format!(
                "input {index} is {}, not DINT",
                other.kind()
            ))),
        }
    }

    /// Output as DINT
    pub fn output_dint(&self, index: PortId) -> Result<i32, AlgorithmFault> {
        match self.output(index)? {
            Value::Dint(v) => Ok(*v),
            other => Err(AlgorithmFault::msg(format!(
                "output {index} is {}, not DINT",
                other.kind()
            ))),
        }
    }

    /// Number of input ports
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output ports
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Engine-side refresh of one input during `read_input_data`
    pub(crate) fn refresh_input(&mut self, index: PortId, value: Value) {
        if let Some(slot) = self.inputs.get_mut(index) {
            *slot = value;
        }
    }

    /// Engine-side view of an output for publishing
    pub(crate) fn output_raw(&self, index: PortId) -> Option<&Value> {
        self.outputs.get(index)
    }
}

fn out_of_range(index: usize, len: usize) -> AlgorithmFault {
    AlgorithmFault::Value(ValueError::IndexOutOfRange { index, len })
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Records the output events a block fires during one `execute`
///
/// Firing order is preserved; the engine publishes data and forwards
/// triggers in exactly this order.
#[derive(Debug, Default)]
pub struct EventSink {
    fired: Vec<EventId>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire an output event
    pub fn fire(&mut self, event: EventId) {
        self.fired.push(event);
    }

    /// Events fired so far, in order
    pub fn fired(&self) -> &[EventId] {
        &self.fired
    }

    pub fn take(self) -> Vec<EventId> {
        self.fired
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Block Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The capability every block type implements
pub trait FunctionBlock: Send {
    /// The static interface of this block type
    fn interface(&self) -> Arc<InterfaceSpec>;

    /// Run the algorithm(s) associated with the given event input
    ///
    /// Runs synchronously to completion on the calling chain worker and must
    /// not block on I/O. Output events are recorded through `events`; a block
    /// may fire zero, one, or many per input event.
    fn execute(
        &mut self,
        event: EventId,
        io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault>;
}

/// Function-based block (for simple types and tests)
pub struct FnBlock<F>
where
    F: FnMut(EventId, &mut BlockIo, &mut EventSink) -> Result<(), AlgorithmFault> + Send,
{
    interface: Arc<InterfaceSpec>,
    func: F,
}

impl<F> FnBlock<F>
where
    F: FnMut(EventId, &mut BlockIo, &mut EventSink) -> Result<(), AlgorithmFault> + Send,
{
    pub fn new(interface: Arc<InterfaceSpec>, func: F) -> Self {
        Self { interface, func }
    }
}

impl<F> FunctionBlock for FnBlock<F>
where
    F: FnMut(EventId, &mut BlockIo, &mut EventSink) -> Result<(), AlgorithmFault> + Send,
{
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.interface)
    }

    fn execute(
        &mut self,
        event: EventId,
        io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        (self.func)(event, io, events)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::ValueKind;

    fn spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("REQ", &[0])
            .event_out("CNF", &[0])
            .data_in_with_default("IN", ValueKind::Dint, Value::Dint(7))
            .data_out("OUT", ValueKind::Dint)
    }

    #[test]
    fn test_io_defaults() {
        let io = BlockIo::from_interface(&spec());
        assert_eq!(io.input(0).unwrap(), &Value::Dint(7));
        assert_eq!(io.output(0).unwrap(), &Value::Dint(0));
        assert_eq!(io.input_count(), 1);
        assert_eq!(io.output_count(), 1);
    }

    #[test]
    fn test_io_bounds() {
        let io = BlockIo::from_interface(&spec());
        assert!(matches!(
            io.input(3),
            Err(AlgorithmFault::Value(ValueError::IndexOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_set_output_kind_checked() {
        let mut io = BlockIo::from_interface(&spec());
        io.set_output(0, Value::Dint(5)).unwrap();
        assert_eq!(io.output_dint(0).unwrap(), 5);

        let err = io.set_output(0, Value::Bool(true)).unwrap_err();
        assert!(matches!(
            err,
            AlgorithmFault::Value(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_event_sink_order() {
        let mut sink = EventSink::new();
        sink.fire(1);
        sink.fire(0);
        sink.fire(1);
        assert_eq!(sink.fired(), &[1, 0, 1]);
        assert_eq!(sink.take(), vec![1, 0, 1]);
    }

    #[test]
    fn test_fn_block() {
        let interface = Arc::new(spec());
        let mut block = FnBlock::new(Arc::clone(&interface), |_event, io, events| {
            let v = io.input_dint(0)?;
            io.set_output(0, Value::Dint(v * 2))?;
            events.fire(0);
            Ok(())
        });

        let mut io = BlockIo::from_interface(&interface);
        let mut sink = EventSink::new();
        block.execute(0, &mut io, &mut sink).unwrap();

        assert_eq!(io.output_dint(0).unwrap(), 14);
        assert_eq!(sink.fired(), &[0]);
    }
}
