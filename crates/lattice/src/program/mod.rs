//! Program descriptions
//!
//! A program file is the JSON description of one resource's network: block
//! instances, data and event connections, and the initial event injections.
//! Ports are referenced by `instance.PORT` name here; the loader resolves
//! names to interface indices and replays everything onto the resource's
//! lifecycle API. The engine itself never sees names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use block_runtime::{BlockRegistry, EngineError, PortRef, Resource};
use block_types::InterfaceSpec;

// ─────────────────────────────────────────────────────────────────────────────
// Program Format
// ─────────────────────────────────────────────────────────────────────────────

/// One block instance in a program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Instance id, unique within the resource
    pub id: String,
    /// Registered block type name
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A data connection, `instance.PORT` to `instance.PORT`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLinkConfig {
    pub from: String,
    pub to: String,
}

/// An event connection with an optional with-list override (port names)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLinkConfig {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Vec<String>>,
}

/// An initial event injection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConfig {
    pub instance: String,
    pub event: String,
}

/// A complete program description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub data: Vec<DataLinkConfig>,
    #[serde(default)]
    pub events: Vec<EventLinkConfig>,
    #[serde(default)]
    pub start: Vec<StartConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Program Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from loading or applying a program
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("failed to read program file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse program file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("bad port reference {0:?}, expected \"instance.PORT\"")]
    BadPortRef(String),

    #[error("block {0:?} is not declared in the program")]
    UnknownBlock(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Read a program description from a JSON file
pub fn load_file(path: impl AsRef<Path>) -> Result<ProgramConfig, ProgramError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Replay a program onto a resource
///
/// Creates the instances, wires the connections, then fires the start
/// injections, in that order. Port names resolve through the registry's
/// interfaces; every failure is surfaced before any event runs.
pub fn apply(
    resource: &Resource,
    registry: &BlockRegistry,
    program: &ProgramConfig,
) -> Result<(), ProgramError> {
    // resolve every instance's interface up front
    let mut interfaces: HashMap<&str, Arc<InterfaceSpec>> = HashMap::new();
    for block in &program.blocks {
        let interface = registry
            .interface(&block.type_name)
            .ok_or_else(|| EngineError::UnknownType(block.type_name.clone()))?;
        interfaces.insert(block.id.as_str(), interface);
    }

    let interface_of = |id: &str| -> Result<&Arc<InterfaceSpec>, ProgramError> {
        interfaces
            .get(id)
            .ok_or_else(|| ProgramError::UnknownBlock(id.to_string()))
    };
    let unknown_port = |instance: &str, name: &str| -> ProgramError {
        ProgramError::Engine(EngineError::UnknownPort {
            instance: instance.to_string(),
            name: name.to_string(),
        })
    };

    for block in &program.blocks {
        resource.create_instance(&block.type_name, block.id.as_str())?;
    }

    for link in &program.data {
        let (src_id, src_port) = split_ref(&link.from)?;
        let (dst_id, dst_port) = split_ref(&link.to)?;
        let src = interface_of(src_id)?
            .data_output_index(src_port)
            .ok_or_else(|| unknown_port(src_id, src_port))?;
        let dst = interface_of(dst_id)?
            .data_input_index(dst_port)
            .ok_or_else(|| unknown_port(dst_id, dst_port))?;
        resource.connect_data(&PortRef::new(src_id, src), &PortRef::new(dst_id, dst))?;
    }

    for link in &program.events {
        let (src_id, src_ev) = split_ref(&link.from)?;
        let (dst_id, dst_ev) = split_ref(&link.to)?;
        let src = interface_of(src_id)?
            .event_output_index(src_ev)
            .ok_or_else(|| unknown_port(src_id, src_ev))?;
        let dst_interface = interface_of(dst_id)?;
        let dst = dst_interface
            .event_input_index(dst_ev)
            .ok_or_else(|| unknown_port(dst_id, dst_ev))?;
        let with = link
            .with
            .as_ref()
            .map(|names| {
                names
                    .iter()
                    .map(|name| {
                        dst_interface
                            .data_input_index(name)
                            .ok_or_else(|| unknown_port(dst_id, name))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        resource.connect_event(&PortRef::new(src_id, src), &PortRef::new(dst_id, dst), with)?;
    }

    for start in &program.start {
        let event = interface_of(&start.instance)?
            .event_input_index(&start.event)
            .ok_or_else(|| unknown_port(&start.instance, &start.event))?;
        resource.inject_event(&start.instance, event)?;
    }

    tracing::info!(
        program = %program.name,
        blocks = program.blocks.len(),
        data = program.data.len(),
        events = program.events.len(),
        "program applied"
    );
    Ok(())
}

fn split_ref(text: &str) -> Result<(&str, &str), ProgramError> {
    text.split_once('.')
        .filter(|(instance, port)| !instance.is_empty() && !port.is_empty())
        .ok_or_else(|| ProgramError::BadPortRef(text.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
