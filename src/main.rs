use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use desarc::backend::local::LocalBackend;
use desarc::config::{RouterConfig, StorageConfig};
use desarc::http::{router, AppState};
use desarc::retention::RetentionManager;
use desarc::retrieval::engine::RetrievalEngine;
use desarc::retrieval::zones::{Zone, ZoneDispatcher};

#[derive(Parser)]
#[command(name = "desarc", version, about = "Shard archival retrieval server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP retrieval surface over a single-zone local-filesystem backend.
    Serve {
        #[arg(long, default_value = "./data")]
        data_dir: std::path::PathBuf,
        #[arg(long, default_value = "8")]
        n_bits: u8,
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { data_dir, n_bits, bind } => serve(data_dir, n_bits, bind).await,
    }
}

async fn serve(data_dir: std::path::PathBuf, n_bits: u8, bind: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let storage = StorageConfig::default();
    let backend = Arc::new(LocalBackend::new(&data_dir));

    let engine = RetrievalEngine::new(
        backend.clone(),
        RouterConfig { n_bits },
        storage.clone(),
        Default::default(),
        None,
    );

    let retention = Arc::new(RetentionManager::new(
        backend.clone(),
        backend,
        storage.overlay_prefix.clone(),
        storage.bigfiles_prefix.clone(),
        n_bits,
    ));

    let dispatcher = Arc::new(ZoneDispatcher::new(n_bits, vec![Zone {
        name: "default".into(),
        start: 0,
        end: (1u32 << n_bits) - 1,
        engine,
    }])?);

    let state = Arc::new(AppState { dispatcher, retention });
    tracing::info!(%bind, data_dir = %data_dir.display(), "starting desarc retrieval server");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
