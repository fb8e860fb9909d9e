//! Lattice Runtime
//!
//! Function-block runtime: loads a program description, wires the network,
//! and runs its event chains until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use block_runtime::{BlockRegistry, Resource};

use lattice::blocks::register_standard_blocks;
use lattice::config::RuntimeConfig;
use lattice::program;

/// Lattice Function Block Runtime
#[derive(Parser, Debug)]
#[command(name = "lattice")]
#[command(about = "Lattice Function Block Runtime", long_about = None)]
struct Args {
    /// Path to the runtime configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the program description (overrides the config)
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// Number of event chains (overrides the config)
    #[arg(long)]
    chains: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lattice=info,block_runtime=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Lattice runtime v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(chains) = args.chains {
        config.chains.chains = chains;
    }
    let program_path = args.program.or(config.program.clone());

    // Register block types and bring up the resource
    let mut registry = BlockRegistry::new();
    register_standard_blocks(&mut registry)?;
    let registry = Arc::new(registry);
    let resource = Resource::new(Arc::clone(&registry), config.chains.clone());

    // Load the program
    match &program_path {
        Some(path) => {
            info!("Loading program from: {}", path.display());
            match program::load_file(path) {
                Ok(loaded) => {
                    if let Err(e) = program::apply(&resource, &registry, &loaded) {
                        error!("Failed to apply program {}: {}", loaded.name, e);
                        std::process::exit(1);
                    }
                    info!(
                        "Running program: {} ({} blocks, {} chains)",
                        loaded.name,
                        resource.len(),
                        resource.chain_count()
                    );
                }
                Err(e) => {
                    error!("Failed to load program from {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("No program configured; resource is empty until wired remotely");
        }
    }

    // Log faults as they happen
    let mut faults = resource.faults();
    tokio::spawn(async move {
        while let Ok(fault) = faults.recv().await {
            error!(
                instance = %fault.instance,
                event = fault.event,
                "trigger fault: {}",
                fault.kind
            );
        }
    });

    // Run until a shutdown signal arrives
    shutdown_signal().await;

    info!("Shutting down chains...");
    if let Err(e) = resource.shutdown().await {
        error!("Resource did not shut down cleanly: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
