//! Hand-wired counter network driven by the tick handler.
//!
//! A "panel" block feeds count-enable and preset values into an up-counter;
//! a tick handler stands in for a cyclic field-bus scan. Watch callbacks
//! print the counter value as it changes.

use std::sync::Arc;
use std::time::Duration;

use block_runtime::{
    BlockRegistry, ChainsConfig, FnBlock, HandlerSet, PortRef, Resource,
};
use block_types::{InterfaceSpec, Value, ValueKind};

use lattice::blocks::register_standard_blocks;
use lattice::handlers::TickHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("lattice=info,block_runtime=info")
        .init();

    let mut registry = BlockRegistry::new();
    register_standard_blocks(&mut registry)?;

    // operator panel: constant count-enable and preset
    let panel = InterfaceSpec::new()
        .event_in("REQ", &[])
        .event_out("CNF", &[0, 1])
        .data_out("CU", ValueKind::Bool)
        .data_out("PV", ValueKind::Dint);
    registry.register("Panel", panel, |iface| {
        Box::new(FnBlock::new(iface, |_ev, io, events| {
            io.set_output(0, Value::Bool(true))?;
            io.set_output(1, Value::Dint(3))?;
            events.fire(0);
            Ok(())
        }))
    })?;

    let resource = Resource::new(Arc::new(registry), ChainsConfig::default());
    resource.create_instance("Panel", "panel")?;
    resource.create_instance("CTU", "ctu")?;

    resource.connect_data(&PortRef::new("panel", 0), &PortRef::new("ctu", 0))?;
    resource.connect_data(&PortRef::new("panel", 1), &PortRef::new("ctu", 2))?;
    resource.connect_event(&PortRef::new("panel", 0), &PortRef::new("ctu", 0), None)?;

    for port in [1, 0] {
        resource.watch_output(
            &PortRef::new("ctu", port),
            Arc::new(move |change| {
                println!("ctu[{}] -> {}", change.port, change.value.to_text());
            }),
        )?;
    }

    let mut handlers = HandlerSet::new();
    handlers.register(TickHandler::new("scan", Duration::from_millis(500)).inject("panel", 0));
    handlers.enable_all(&resource.handle()).await;

    tokio::time::sleep(Duration::from_secs(3)).await;

    handlers.disable_all().await;
    resource.quiesce().await;
    println!(
        "final CV = {}",
        resource.read_output(&PortRef::new("ctu", 1))?.to_text()
    );
    resource.shutdown().await?;
    Ok(())
}
