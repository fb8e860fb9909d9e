//! Function-block interface specification
//!
//! The static description of a block type: its event inputs/outputs, data
//! inputs/outputs, and the with-lists tying events to the data ports that are
//! read or written when the event fires. Ports are addressed by declaration
//! index everywhere in the engine; names exist for tooling and program files.

use serde::{Deserialize, Serialize};

use crate::{Value, ValueKind};

// ─────────────────────────────────────────────────────────────────────────────
// Port / Event Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Definition of an event port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDef {
    /// Event name (tooling metadata)
    pub name: String,
    /// Data port indices read (input events) or written (output events)
    /// when this event fires
    #[serde(default)]
    pub with: Vec<usize>,
}

/// Definition of a data port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Port name (tooling metadata)
    pub name: String,
    /// Value kind flowing through the port
    pub kind: ValueKind,
    /// Initial value; the kind's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PortDef {
    fn initial_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interface Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from interface validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterfaceError {
    #[error("with-list of event {event:?} references data port {index} (count is {count})")]
    WithIndexOutOfRange {
        event: String,
        index: usize,
        count: usize,
    },

    #[error("duplicate port name {name:?}")]
    DuplicatePortName { name: String },

    #[error("default for port {name:?} is {actual}, declared {declared}")]
    DefaultKindMismatch {
        name: String,
        declared: ValueKind,
        actual: ValueKind,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Interface Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Static interface of a block type
///
/// Built with the chaining constructors and checked once with [`validate`].
/// Declaration order assigns the port indices used by connections and by the
/// engine's dispatch; the engine never consults names.
///
/// [`validate`]: InterfaceSpec::validate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceSpec {
    /// Event inputs, with-lists naming data inputs to refresh
    #[serde(default)]
    pub events_in: Vec<EventDef>,
    /// Event outputs, with-lists naming data outputs to publish
    #[serde(default)]
    pub events_out: Vec<EventDef>,
    /// Data inputs
    #[serde(default)]
    pub data_in: Vec<PortDef>,
    /// Data outputs
    #[serde(default)]
    pub data_out: Vec<PortDef>,
}

impl InterfaceSpec {
    /// Create an empty interface
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an event input with its with-list of data-input indices
    pub fn event_in(mut self, name: impl Into<String>, with: &[usize]) -> Self {
        self.events_in.push(EventDef {
            name: name.into(),
            with: with.to_vec(),
        });
        self
    }

    /// Declare an event output with its with-list of data-output indices
    pub fn event_out(mut self, name: impl Into<String>, with: &[usize]) -> Self {
        self.events_out.push(EventDef {
            name: name.into(),
            with: with.to_vec(),
        });
        self
    }

    /// Declare a data input
    pub fn data_in(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.data_in.push(PortDef {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// Declare a data input with an initial value
    pub fn data_in_with_default(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
    ) -> Self {
        self.data_in.push(PortDef {
            name: name.into(),
            kind,
            default: Some(default),
        });
        self
    }

    /// Declare a data output
    pub fn data_out(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.data_out.push(PortDef {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// Declare a data output with an initial value
    pub fn data_out_with_default(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
    ) -> Self {
        self.data_out.push(PortDef {
            name: name.into(),
            kind,
            default: Some(default),
        });
        self
    }

    /// Check with-list ranges, name uniqueness, and default kinds
    pub fn validate(&self) -> Result<(), InterfaceError> {
        for ev in &self.events_in {
            for &i in &ev.with {
                if i >= self.data_in.len() {
                    return Err(InterfaceError::WithIndexOutOfRange {
                        event: ev.name.clone(),
                        index: i,
                        count: self.data_in.len(),
                    });
                }
            }
        }
        for ev in &self.events_out {
            for &i in &ev.with {
                if i >= self.data_out.len() {
                    return Err(InterfaceError::WithIndexOutOfRange {
                        event: ev.name.clone(),
                        index: i,
                        count: self.data_out.len(),
                    });
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in self
            .events_in
            .iter()
            .chain(&self.events_out)
            .map(|e| &e.name)
        {
            if !seen.insert(format!("ev:{name}")) {
                return Err(InterfaceError::DuplicatePortName { name: name.clone() });
            }
        }
        for name in self.data_in.iter().chain(&self.data_out).map(|p| &p.name) {
            if !seen.insert(format!("data:{name}")) {
                return Err(InterfaceError::DuplicatePortName { name: name.clone() });
            }
        }

        for port in self.data_in.iter().chain(&self.data_out) {
            if let Some(default) = &port.default {
                if default.kind() != port.kind {
                    return Err(InterfaceError::DefaultKindMismatch {
                        name: port.name.clone(),
                        declared: port.kind.clone(),
                        actual: default.kind(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of event inputs
    pub fn event_input_count(&self) -> usize {
        self.events_in.len()
    }

    /// Number of event outputs
    pub fn event_output_count(&self) -> usize {
        self.events_out.len()
    }

    /// Number of data inputs
    pub fn data_input_count(&self) -> usize {
        self.data_in.len()
    }

    /// Number of data outputs
    pub fn data_output_count(&self) -> usize {
        self.data_out.len()
    }

    /// Resolve an event input name to its index
    pub fn event_input_index(&self, name: &str) -> Option<usize> {
        self.events_in.iter().position(|e| e.name == name)
    }

    /// Resolve an event output name to its index
    pub fn event_output_index(&self, name: &str) -> Option<usize> {
        self.events_out.iter().position(|e| e.name == name)
    }

    /// Resolve a data input name to its index
    pub fn data_input_index(&self, name: &str) -> Option<usize> {
        self.data_in.iter().position(|p| p.name == name)
    }

    /// Resolve a data output name to its index
    pub fn data_output_index(&self, name: &str) -> Option<usize> {
        self.data_out.iter().position(|p| p.name == name)
    }

    /// Initial input port variables
    pub fn default_inputs(&self) -> Vec<Value> {
        self.data_in.iter().map(|p| p.initial_value()).collect()
    }

    /// Initial output port variables
    pub fn default_outputs(&self) -> Vec<Value> {
        self.data_out.iter().map(|p| p.initial_value()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
