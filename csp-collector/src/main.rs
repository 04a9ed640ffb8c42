use anyhow::Context;
use clap::Parser;
use csp_collector::{AppState, CollectorServer};
use csp_core::{ConfigLoader, ReportService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "csp-collector")]
#[command(about = "Collects CSP violation reports and renders them per domain", version)]
struct Args {
    /// Config file path (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long, short = 'l')]
    listen: Option<SocketAddr>,

    /// Directory for ledgers and rendered pages, overriding the config file
    #[arg(long, short = 'd')]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = ConfigLoader::load_or_default(args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    let service = ReportService::open(&config.storage, config.site.clone())
        .with_context(|| format!("Failed to open data directory {:?}", config.storage.data_dir))?;
    let service = Arc::new(service);

    // Bring views and the landing page in line with the ledgers on disk
    let startup = service.clone();
    let stats = tokio::task::spawn_blocking(move || -> csp_core::Result<_> {
        startup.ensure_assets()?;
        startup.reconcile()
    })
    .await?
    .context("Failed to reconcile report store")?;
    if stats.failed > 0 {
        tracing::warn!("{} domain(s) could not be rendered at startup", stats.failed);
    }

    let state = AppState {
        service,
        max_body_bytes: config.server.max_body_bytes,
    };
    let server = CollectorServer::bind(config.server.listen, state)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
