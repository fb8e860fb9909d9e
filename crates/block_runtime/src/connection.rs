//! Ports and connection links
//!
//! Connections are container-owned edges between index-addressed ports.
//! Instances never own their peers; a data input holds at most one link slot
//! referencing the source's published value, and an event output holds the
//! ordered list of destinations it triggers.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use block_types::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Port References
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to one port of one instance
///
/// Which port space the index addresses (data in/out, event in/out) follows
/// from where the reference is used; indices are the engine's only addressing
/// scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Instance id within the owning resource
    pub instance: String,
    /// Port index within the instance's interface
    pub port: usize,
}

impl PortRef {
    pub fn new(instance: impl Into<String>, port: usize) -> Self {
        Self {
            instance: instance.into(),
            port,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.instance, self.port)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Link Slots
// ─────────────────────────────────────────────────────────────────────────────

/// The single data connection feeding one data input
///
/// `slot` is a shared reference into the source instance's published output;
/// the destination copies from it during `read_input_data`.
pub(crate) struct InputLink {
    pub source: PortRef,
    pub slot: Arc<RwLock<Value>>,
}

/// One destination of an event connection
#[derive(Clone)]
pub(crate) struct EventLink {
    /// Destination event input (instance id + event input index)
    pub dest: PortRef,
    /// With-list override: data-input indices refreshed before the
    /// destination fires; the destination interface's with-list when absent
    pub with: Option<Arc<Vec<usize>>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Output Watches
// ─────────────────────────────────────────────────────────────────────────────

/// A published data-output change, delivered to registered watchers
#[derive(Debug, Clone)]
pub struct OutputChange {
    pub instance: String,
    pub port: usize,
    pub value: Value,
}

/// Callback invoked when a watched data output's published value changes
///
/// Invoked on the chain worker mid-trigger; implementations should hand off
/// (e.g. push into a channel) rather than do protocol work inline.
pub type OutputCallback = Arc<dyn Fn(&OutputChange) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ref_display() {
        let p = PortRef::new("counter-1", 2);
        assert_eq!(p.to_string(), "counter-1[2]");
    }

    #[test]
    fn test_port_ref_serde() {
        let p = PortRef::new("a", 0);
        let json = serde_json::to_string(&p).unwrap();
        let back: PortRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
