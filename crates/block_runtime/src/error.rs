//! Engine error taxonomy
//!
//! Structural errors (bad indices, bad wiring, unknown ids) surface
//! synchronously to the lifecycle caller. Per-trigger algorithm faults are
//! reported through the resource's fault sink instead and never appear here.

use block_types::{InterfaceError, ValueKind};

use crate::connection::PortRef;

/// Errors from lifecycle and wiring operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("type mismatch wiring {src} -> {dest}: {source_kind} vs {dest_kind}")]
    TypeMismatch {
        src: PortRef,
        dest: PortRef,
        source_kind: ValueKind,
        dest_kind: ValueKind,
    },

    #[error("port index out of range: {port} (count is {count})")]
    PortIndexOutOfRange { port: PortRef, count: usize },

    #[error("data input {0} already connected")]
    AlreadyConnected(PortRef),

    #[error("{0} is not connected")]
    NotConnected(PortRef),

    #[error("duplicate instance id {0:?}")]
    DuplicateInstanceId(String),

    #[error("instance {0:?} not found")]
    InstanceNotFound(String),

    #[error("unknown block type {0:?}")]
    UnknownType(String),

    #[error("unknown port {name:?} on instance {instance:?}")]
    UnknownPort { instance: String, name: String },

    #[error("chain {0} does not exist")]
    UnknownChain(usize),

    #[error("chain {0} queue is full")]
    ChainBackpressure(usize),

    #[error("chain queue closed")]
    ChannelClosed,

    #[error("shutdown timed out")]
    ShutdownTimeout,

    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
