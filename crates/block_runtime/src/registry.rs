//! Block type registry
//!
//! Holds every block type a resource can instantiate: its interface and a
//! factory producing fresh instances. Composite types resolve their inner
//! network at registration time and register like any other type.

use std::collections::HashMap;
use std::sync::Arc;

use block_types::InterfaceSpec;

use crate::block::FunctionBlock;
use crate::composite::{CompositeBlock, CompositeSpec, CompositeTemplate};
use crate::error::{EngineError, EngineResult};

/// Factory producing fresh block instances of one type
pub type BlockFactory = Arc<dyn Fn() -> Box<dyn FunctionBlock> + Send + Sync>;

/// Entry in the block registry
struct TypeEntry {
    interface: Arc<InterfaceSpec>,
    factory: BlockFactory,
}

/// Registry of all available block types
#[derive(Default)]
pub struct BlockRegistry {
    types: HashMap<String, TypeEntry>,
}

impl BlockRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block type
    ///
    /// The interface is validated once here; `make` receives the shared
    /// interface and returns a fresh instance. Re-registering a name
    /// replaces the previous type.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        interface: InterfaceSpec,
        make: impl Fn(Arc<InterfaceSpec>) -> Box<dyn FunctionBlock> + Send + Sync + 'static,
    ) -> EngineResult<()> {
        interface.validate()?;
        let interface = Arc::new(interface);
        let captured = Arc::clone(&interface);
        self.types.insert(
            name.into(),
            TypeEntry {
                interface,
                factory: Arc::new(move || make(Arc::clone(&captured))),
            },
        );
        Ok(())
    }

    /// Register a composite block type
    ///
    /// The inner block types must already be registered; the composite's
    /// sub-network is resolved to indices and factories now, so instantiation
    /// later cannot fail.
    pub fn register_composite(
        &mut self,
        name: impl Into<String>,
        spec: CompositeSpec,
    ) -> EngineResult<()> {
        let template = Arc::new(CompositeTemplate::resolve(spec, self)?);
        let interface = Arc::clone(&template.interface);
        let factory: BlockFactory = Arc::new(move || {
            Box::new(CompositeBlock::instantiate(Arc::clone(&template)))
        });
        self.types
            .insert(name.into(), TypeEntry { interface, factory });
        Ok(())
    }

    /// Get a type's interface
    pub fn interface(&self, name: &str) -> Option<Arc<InterfaceSpec>> {
        self.types.get(name).map(|e| Arc::clone(&e.interface))
    }

    /// Interface and factory of a type, for composite resolution
    pub(crate) fn entry(&self, name: &str) -> Option<(Arc<InterfaceSpec>, BlockFactory)> {
        self.types
            .get(name)
            .map(|e| (Arc::clone(&e.interface), Arc::clone(&e.factory)))
    }

    /// Instantiate a type
    pub fn make(&self, name: &str) -> EngineResult<(Arc<InterfaceSpec>, Box<dyn FunctionBlock>)> {
        let entry = self
            .types
            .get(name)
            .ok_or_else(|| EngineError::UnknownType(name.to_string()))?;
        Ok((Arc::clone(&entry.interface), (entry.factory)()))
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// All registered type names
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|s| s.as_str())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FnBlock;
    use block_types::ValueKind;

    fn passthrough_interface() -> InterfaceSpec {
        InterfaceSpec::new()
            .event_in("REQ", &[0])
            .event_out("CNF", &[0])
            .data_in("IN", ValueKind::Dint)
            .data_out("OUT", ValueKind::Dint)
    }

    #[test]
    fn test_empty_registry() {
        let registry = BlockRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(!registry.contains("anything"));
    }

    #[test]
    fn test_register_and_make() {
        let mut registry = BlockRegistry::new();
        registry
            .register("Passthrough", passthrough_interface(), |iface| {
                Box::new(FnBlock::new(iface, |_ev, io, events| {
                    let v = io.input(0)?.clone();
                    io.set_output(0, v)?;
                    events.fire(0);
                    Ok(())
                }))
            })
            .unwrap();

        assert!(registry.contains("Passthrough"));
        let (iface, block) = registry.make("Passthrough").unwrap();
        assert_eq!(iface.data_input_count(), 1);
        assert_eq!(block.interface().event_input_count(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let registry = BlockRegistry::new();
        assert!(matches!(
            registry.make("nope"),
            Err(EngineError::UnknownType(_))
        ));
    }

    #[test]
    fn test_register_rejects_bad_interface() {
        let mut registry = BlockRegistry::new();
        let bad = InterfaceSpec::new().event_in("REQ", &[4]);
        let err = registry
            .register("Bad", bad, |iface| {
                Box::new(FnBlock::new(iface, |_, _, _| Ok(())))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Interface(_)));
    }
}
