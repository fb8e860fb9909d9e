//! External handlers
//!
//! Implementations of the engine's external-handler boundary shipped with
//! the runtime.

mod tick;

pub use tick::TickHandler;
