//! Block Types - Core data structures for the function-block runtime
//!
//! This crate contains the IEC value model, the per-kind conversion table
//! used by protocol adapters, and the function-block interface specification.

mod convert;
mod interface;
mod value;

pub use convert::*;
pub use interface::*;
pub use value::*;
