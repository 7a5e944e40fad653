//! Vitrina REST API entry point.
//!
//! Binary name: `vitrina`
//!
//! Parses CLI arguments, loads configuration, initializes the database
//! and the chat orchestrator, then starts the HTTP server.

mod http;
mod state;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use state::AppState;
use vitrina_types::config::VitrinaConfig;

#[derive(Debug, Parser)]
#[command(name = "vitrina", about = "Conversational storefront for an NFT catalog")]
struct Cli {
    /// Host to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1", env = "VITRINA_HOST")]
    host: String,

    /// Port to bind the HTTP server to.
    #[arg(long, default_value_t = 8080, env = "VITRINA_PORT")]
    port: u16,

    /// Path to the TOML configuration file. Missing file means defaults.
    #[arg(long, default_value = "vitrina.toml", env = "VITRINA_CONFIG")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,vitrina=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(&cli.config)?;
    let state = AppState::init(config).await?;

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Vitrina API listening");

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Load configuration from a TOML file, falling back to defaults when
/// the file does not exist.
fn load_config(path: &PathBuf) -> anyhow::Result<VitrinaConfig> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config file {}: {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        Ok(VitrinaConfig::default())
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
