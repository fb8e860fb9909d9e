//! Block Runtime - Execution engine for function-block networks
//!
//! This crate contains the function-block contract, the type registry, the
//! connection model, the event-chain workers, and the resource container
//! that ties them together.

pub use block_types;

mod block;
mod chain;
mod composite;
mod connection;
mod error;
mod handler;
mod registry;
mod resource;

pub use block::*;
pub use chain::{ChainId, ChainState, Fault, FaultKind, Trigger};
pub use composite::CompositeSpec;
pub use connection::{OutputCallback, OutputChange, PortRef};
pub use error::*;
pub use handler::*;
pub use registry::{BlockFactory, BlockRegistry};
pub use resource::{ChainsConfig, Resource};
