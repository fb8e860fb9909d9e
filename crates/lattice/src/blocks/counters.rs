//! Counter blocks
//!
//! IEC 61131-3 style down/up counters. The confirmation event fires on every
//! request regardless of which branch the algorithm took; only the data
//! differs.

use std::sync::Arc;

use block_runtime::{AlgorithmFault, BlockIo, EventId, EventSink, FunctionBlock};
use block_types::{InterfaceSpec, Value, ValueKind};

// ─────────────────────────────────────────────────────────────────────────────
// Down Counter (CTD)
// ─────────────────────────────────────────────────────────────────────────────

mod ctd {
    pub const CD: usize = 0;
    pub const LD: usize = 1;
    pub const PV: usize = 2;
    pub const Q: usize = 0;
    pub const CV: usize = 1;
    pub const REQ: usize = 0;
    pub const CNF: usize = 0;
}

/// Down counter
///
/// On `REQ`: a set `LD` loads `CV` from `PV`; otherwise a set `CD`
/// decrements `CV` until the representable minimum. `Q` reports `CV <= 0`.
/// `CNF` fires unconditionally.
pub struct DownCounter {
    interface: Arc<InterfaceSpec>,
}

impl DownCounter {
    pub fn new(interface: Arc<InterfaceSpec>) -> Self {
        Self { interface }
    }

    pub fn interface_spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("REQ", &[ctd::CD, ctd::PV, ctd::LD])
            .event_out("CNF", &[ctd::Q, ctd::CV])
            .data_in("CD", ValueKind::Bool)
            .data_in("LD", ValueKind::Bool)
            .data_in("PV", ValueKind::Dint)
            .data_out("Q", ValueKind::Bool)
            .data_out("CV", ValueKind::Dint)
    }
}

impl FunctionBlock for DownCounter {
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.interface)
    }

    fn execute(
        &mut self,
        _event: EventId,
        io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        let cd = io.input_bool(ctd::CD)?;
        let ld = io.input_bool(ctd::LD)?;
        let pv = io.input_dint(ctd::PV)?;
        let mut cv = io.output_dint(ctd::CV)?;

        if ld {
            cv = pv;
        } else if cd && cv > i32::MIN {
            cv -= 1;
        }
        io.set_output(ctd::CV, Value::Dint(cv))?;
        io.set_output(ctd::Q, Value::Bool(cv <= 0))?;

        events.fire(ctd::CNF);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Up Counter (CTU)
// ─────────────────────────────────────────────────────────────────────────────

mod ctu {
    pub const CU: usize = 0;
    pub const R: usize = 1;
    pub const PV: usize = 2;
    pub const Q: usize = 0;
    pub const CV: usize = 1;
    pub const CNF: usize = 0;
}

/// Up counter
///
/// On `REQ`: a set `R` resets `CV` to zero; otherwise a set `CU` increments
/// `CV` until the representable maximum. `Q` reports `CV >= PV`. `CNF` fires
/// unconditionally.
pub struct UpCounter {
    interface: Arc<InterfaceSpec>,
}

impl UpCounter {
    pub fn new(interface: Arc<InterfaceSpec>) -> Self {
        Self { interface }
    }

    pub fn interface_spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("REQ", &[ctu::CU, ctu::PV, ctu::R])
            .event_out("CNF", &[ctu::Q, ctu::CV])
            .data_in("CU", ValueKind::Bool)
            .data_in("R", ValueKind::Bool)
            .data_in("PV", ValueKind::Dint)
            .data_out("Q", ValueKind::Bool)
            .data_out("CV", ValueKind::Dint)
    }
}

impl FunctionBlock for UpCounter {
    fn interface(&self) -> Arc<InterfaceSpec> {
        Arc::clone(&self.interface)
    }

    fn execute(
        &mut self,
        _event: EventId,
        io: &mut BlockIo,
        events: &mut EventSink,
    ) -> Result<(), AlgorithmFault> {
        let cu = io.input_bool(ctu::CU)?;
        let reset = io.input_bool(ctu::R)?;
        let pv = io.input_dint(ctu::PV)?;
        let mut cv = io.output_dint(ctu::CV)?;

        if reset {
            cv = 0;
        } else if cu && cv < i32::MAX {
            cv += 1;
        }
        io.set_output(ctu::CV, Value::Dint(cv))?;
        io.set_output(ctu::Q, Value::Bool(cv >= pv))?;

        events.fire(ctu::CNF);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ctd() -> (DownCounter, BlockIo) {
        let interface = Arc::new(DownCounter::interface_spec());
        interface.validate().unwrap();
        let io = BlockIo::from_interface(&interface);
        (DownCounter::new(interface), io)
    }

    fn trigger(counter: &mut DownCounter, io: &mut BlockIo) -> Vec<usize> {
        let mut sink = EventSink::new();
        counter.execute(ctd::REQ, io, &mut sink).unwrap();
        sink.take()
    }

    #[test]
    fn test_down_counter_scenario() {
        let (mut counter, mut io) = make_ctd();

        // load the preset
        io.set_input(ctd::LD, Value::Bool(true)).unwrap();
        io.set_input(ctd::PV, Value::Dint(3)).unwrap();
        let fired = trigger(&mut counter, &mut io);
        assert_eq!(fired, vec![ctd::CNF]);
        assert_eq!(io.output_dint(ctd::CV).unwrap(), 3);
        assert_eq!(io.output(ctd::Q).unwrap(), &Value::Bool(false));

        // count down to zero
        io.set_input(ctd::LD, Value::Bool(false)).unwrap();
        io.set_input(ctd::CD, Value::Bool(true)).unwrap();
        for (expected, q) in [(2, false), (1, false), (0, true)] {
            let fired = trigger(&mut counter, &mut io);
            assert_eq!(fired, vec![ctd::CNF], "CNF fires on every trigger");
            assert_eq!(io.output_dint(ctd::CV).unwrap(), expected);
            assert_eq!(io.output(ctd::Q).unwrap(), &Value::Bool(q));
        }
    }

    #[test]
    fn test_down_counter_idle_trigger() {
        let (mut counter, mut io) = make_ctd();

        // neither load nor count-down: data unchanged, CNF still fires
        let fired = trigger(&mut counter, &mut io);
        assert_eq!(fired, vec![ctd::CNF]);
        assert_eq!(io.output_dint(ctd::CV).unwrap(), 0);
        assert_eq!(io.output(ctd::Q).unwrap(), &Value::Bool(true));
    }

    #[test]
    fn test_down_counter_saturates_at_minimum() {
        let (mut counter, mut io) = make_ctd();

        io.set_input(ctd::LD, Value::Bool(true)).unwrap();
        io.set_input(ctd::PV, Value::Dint(i32::MIN)).unwrap();
        trigger(&mut counter, &mut io);
        assert_eq!(io.output_dint(ctd::CV).unwrap(), i32::MIN);

        io.set_input(ctd::LD, Value::Bool(false)).unwrap();
        io.set_input(ctd::CD, Value::Bool(true)).unwrap();
        trigger(&mut counter, &mut io);
        assert_eq!(io.output_dint(ctd::CV).unwrap(), i32::MIN);
    }

    #[test]
    fn test_up_counter() {
        let interface = Arc::new(UpCounter::interface_spec());
        interface.validate().unwrap();
        let mut io = BlockIo::from_interface(&interface);
        let mut counter = UpCounter::new(interface);

        io.set_input(ctu::CU, Value::Bool(true)).unwrap();
        io.set_input(ctu::PV, Value::Dint(2)).unwrap();

        for (expected, q) in [(1, false), (2, true), (3, true)] {
            let mut sink = EventSink::new();
            counter.execute(0, &mut io, &mut sink).unwrap();
            assert_eq!(sink.fired(), &[ctu::CNF]);
            assert_eq!(io.output_dint(ctu::CV).unwrap(), expected);
            assert_eq!(io.output(ctu::Q).unwrap(), &Value::Bool(q));
        }

        io.set_input(ctu::R, Value::Bool(true)).unwrap();
        let mut sink = EventSink::new();
        counter.execute(0, &mut io, &mut sink).unwrap();
        assert_eq!(io.output_dint(ctu::CV).unwrap(), 0);
    }
}
