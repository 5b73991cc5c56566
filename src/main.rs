use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contentfiles::storage::create_storage;
use contentfiles::{AppState, Config, routes};

#[derive(Parser, Debug)]
#[command(name = "contentfiles")]
#[command(about = "REST facade for container/file blob storage")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "CONTENTFILES_PORT", default_value = "5000")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "CONTENTFILES_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Storage connection string (Azure connection string or file://<dir>)
    #[arg(long, env = "CONTENTFILES_STORAGE_CONNECTION", hide_env_values = true)]
    connection_string: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, env = "CONTENTFILES_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "CONTENTFILES_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "contentfiles=debug,tower_http=debug"
    } else {
        "contentfiles=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("failed to load config {}", config_path.display()))?,
        None => Config::default(),
    }
    .with_connection_string(cli.connection_string.clone());

    let storage_config = config.storage_config().context(
        "no storage connection string configured \
         (set CONTENTFILES_STORAGE_CONNECTION or [storage].connection_string)",
    )?;
    let storage = create_storage(storage_config).context("failed to create storage backend")?;
    info!("Using {} blob storage", storage.backend_name());

    let state = AppState::with_config(storage, config);
    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    info!("Starting contentfiles on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
