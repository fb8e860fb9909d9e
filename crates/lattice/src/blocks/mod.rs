//! Standard Block Library
//!
//! The concrete block types shipped with the runtime: counters and event
//! plumbing. Programs reference them by the type names registered here.

mod counters;
mod events;

pub use counters::{DownCounter, UpCounter};
pub use events::{EventMerge, EventSplit};

use block_runtime::{BlockRegistry, EngineResult};

/// Register all standard blocks
pub fn register_standard_blocks(registry: &mut BlockRegistry) -> EngineResult<()> {
    registry.register("CTD", DownCounter::interface_spec(), |iface| {
        Box::new(DownCounter::new(iface))
    })?;
    registry.register("CTU", UpCounter::interface_spec(), |iface| {
        Box::new(UpCounter::new(iface))
    })?;
    registry.register("E_SPLIT", EventSplit::interface_spec(), |iface| {
        Box::new(EventSplit::new(iface))
    })?;
    registry.register("E_MERGE", EventMerge::interface_spec(), |iface| {
        Box::new(EventMerge::new(iface))
    })?;

    tracing::info!(count = registry.len(), "registered standard blocks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_standard_blocks() {
        let mut registry = BlockRegistry::new();
        register_standard_blocks(&mut registry).unwrap();
        for name in ["CTD", "CTU", "E_SPLIT", "E_MERGE"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }
}
