//! Kestrel DS node binary.

use anyhow::{Context, Result};
use clap::Parser;
use kestrel_crypto::Sha2PowVerifier;
use kestrel_directory::wire::DsInstruction;
use kestrel_directory::{DirectoryService, LoopbackConsensus, StaticLookup};
use kestrel_node::{DsNetwork, NodeConfig, NodeSupervisor};
use kestrel_storage::InMemoryStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kestreld")]
#[command(about = "Kestrel directory-service node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Write a fresh single-node configuration
    Init {
        /// Home directory for node data
        #[arg(long, default_value = ".kestrel")]
        home: PathBuf,
    },
    /// Start the DS node
    Start {
        /// Home directory for node data
        #[arg(long, default_value = ".kestrel")]
        home: PathBuf,
    },
    /// Display version information
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn config_path(home: &std::path::Path) -> PathBuf {
    home.join("config.json")
}

fn init_node(home: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&home)
        .with_context(|| format!("failed to create {}", home.display()))?;
    let path = config_path(&home);
    if path.exists() {
        anyhow::bail!("config already exists at {}", path.display());
    }
    let config = NodeConfig::for_local_test(0);
    config.save(&path)?;
    println!("wrote configuration to {}", path.display());
    Ok(())
}

async fn start_node(home: PathBuf) -> Result<()> {
    let config = NodeConfig::load(&config_path(&home))?;
    let keypair = config.keypair()?;

    kestrel_metrics::init();

    let service = Arc::new(DirectoryService::new(
        config.protocol.clone(),
        keypair,
        config.self_peer(),
        config.bootstrap_peers()?,
        Arc::new(InMemoryStorage::new()),
        Arc::new(Sha2PowVerifier),
        Arc::new(LoopbackConsensus::new()),
        Arc::new(StaticLookup),
    ));

    let supervisor = NodeSupervisor::new();
    let network = Arc::new(DsNetwork::new(service.clone()));
    network
        .listen(config.listen, supervisor.cancellation_token())
        .await?;

    // Bootstrap: feed ourselves the set-primary message.
    let mut bootstrap = vec![DsInstruction::SetPrimary as u8];
    config.primary_peer().encode_to(&mut bootstrap);
    let self_peer = config.self_peer();
    if !service.execute(&bootstrap, 0, &self_peer).await {
        anyhow::bail!("bootstrap failed");
    }

    let driver_service = service.clone();
    let driver_token = supervisor.cancellation_token();
    supervisor.spawn_critical("epoch-driver", async move {
        driver_service
            .run_epoch_driver(driver_token)
            .await
            .map_err(Into::into)
    });

    info!("kestreld running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    supervisor.shutdown().await.ok();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { home } => init_node(home),
        Commands::Start { home } => start_node(home).await,
        Commands::Version => {
            println!("kestreld {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
