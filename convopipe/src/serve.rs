//! convopipe-serve - HTTP API over published metrics and run reports
//!
//! Serves the artifacts written by `convopipe-run` from the same storage
//! backend. Read-only.

mod api;

use anyhow::{Context, Result};
use clap::Parser;
use convopipe_core::{storage, Config, Storage, StorageKind};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "convopipe-serve")]
#[command(about = "Serve published convopipe metrics and reports over HTTP")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/convopipe/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (default from config: 127.0.0.1:8080)
    #[arg(long)]
    bind: Option<String>,

    /// Storage backend: local or s3
    #[arg(long)]
    storage: Option<StorageKind>,

    /// Base directory for local storage
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// S3 bucket
    #[arg(long)]
    bucket: Option<String>,

    /// S3 region
    #[arg(long)]
    region: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    config
        .apply_env()
        .context("invalid environment override")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(backend) = args.storage {
        config.storage.backend = backend;
    }
    if let Some(base_path) = args.base_path {
        config.storage.base_path = base_path;
    }
    if let Some(bucket) = args.bucket {
        config.storage.bucket = Some(bucket);
    }
    if let Some(region) = args.region {
        config.storage.region = region;
    }

    // Initialize logging
    let _log_guard =
        convopipe_core::logging::init(&config.logging).context("failed to initialize logging")?;

    config
        .storage
        .validate()
        .context("invalid storage configuration")?;

    // The last reference must drop outside the server runtime
    let storage: Arc<dyn Storage> =
        Arc::from(storage::open(&config.storage).context("failed to open storage")?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    runtime.block_on(serve(&config.server.bind, Arc::clone(&storage)))
}

async fn serve(bind: &str, storage: Arc<dyn Storage>) -> Result<()> {
    let app = api::router(api::AppState { storage });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!(address = %bind, "convopipe-serve listening");
    println!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("convopipe-serve stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
