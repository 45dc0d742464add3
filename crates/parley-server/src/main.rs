//! Parley server - HTTP/WebSocket server for scripted interview sessions.

use anyhow::Result;
use clap::Parser;
use parley_server::{config, logging, routes, state, sweeper};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// Parley server - scripted multi-channel interview simulations.
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "HTTP/WebSocket server for scripted interview sessions")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the scenario templates directory
    #[arg(short, long, value_name = "DIR")]
    scenarios: Option<PathBuf>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes ping traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "flow=debug" or "ws::ping=trace").
    /// Can be specified multiple times. Targets are prefixed with "parley::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.scenarios {
        config.scenarios_dir = dir;
    }

    tracing::info!(
        target: "parley::startup",
        "Loaded configuration (port: {}, scenarios: {}, {} catalog entries)",
        config.port,
        config.scenarios_dir.display(),
        config.catalog.len()
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config));
    sweeper::spawn_idle_sweeper(state.clone());

    let app = routes::router(state);

    tracing::info!(target: "parley::startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
