//! Event plumbing blocks
//!
//! Pure event routing with no data ports: split one trigger into an ordered
//! pair, or merge several trigger sources into one output.

use std::sync::Arc;

use block_runtime::{AlgorithmFault, BlockIo, EventId, EventSink, FunctionBlock};
use block_types::InterfaceSpec;

/// Splits one input event into two output events, `EO1` before `EO2`
pub struct EventSplit {
    interface: Arc<InterfaceSpec>,
}

impl EventSplit {
    pub fn new(interface: Arc<InterfaceSpec>) -> Self {
        Self { interface }
    }

    pub fn interface_spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("EI", &[])
            .event_out("EO1", &[])
            .event_out("EO2", &[])
    }
}

impl FunctionBlock for EventSplit {
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.interface)
    }

    fn execute(
        &mut self,
        _event: EventId,
        _io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        events.fire(0);
        events.fire(1);
        Ok(())
    }
}

/// Merges two input events into one output event (logical OR of triggers)
pub struct EventMerge {
    interface: Arc<InterfaceSpec>,
}

impl EventMerge {
    pub fn new(interface: Arc<InterfaceSpec>) -> Self {
        Self { interface }
    }

    pub fn interface_spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("EI1", &[])
            .event_in("EI2", &[])
            .event_out("EO", &[])
    }
}

impl FunctionBlock for EventMerge {
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.interface)
    }

    fn execute(
        &mut self,
        _event: EventId,
        _io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        events.fire(0);
        Ok(())
    }
}
