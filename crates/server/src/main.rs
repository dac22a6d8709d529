//! chanstore gateway binary.

use anyhow::{Context, Result};
use chanstore_core::config::AppConfig;
use chanstore_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// chanstore - chunked file storage over a messaging channel
#[derive(Parser, Debug)]
#[command(name = "chanstored")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CHANSTORE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional file and `CHANSTORE_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using defaults", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CHANSTORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("chanstore v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    chanstore_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let backend = chanstore_channel::from_config(&config.backend)
        .context("failed to initialize messaging backend")?;
    tracing::info!(
        backend = backend.backend_name(),
        chunk_size = config.transfer.chunk_size,
        "Messaging backend initialized"
    );

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, backend);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
