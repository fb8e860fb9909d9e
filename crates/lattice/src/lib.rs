//! Lattice - Function-block runtime
//!
//! Deployable runtime around the block engine: the standard block library,
//! the JSON program loader, runtime configuration, and external handlers.

pub mod blocks;
pub mod config;
pub mod handlers;
pub mod program;
