mod command;
mod config;
mod connection;
mod flight;
mod transport;

use anyhow::Context;
use clap::Parser;
use config::AgentConfig;
use connection::CommandListener;
use std::path::PathBuf;
use transport::TcpConnector;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Emulated vehicle agent: flies routes on coordinator directives
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coordinator endpoint, e.g. tcp://127.0.0.1:8080
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Interpolation steps per route segment
    #[arg(long)]
    steps: Option<usize>,

    /// Per-report probability of an emulated outage
    #[arg(long)]
    loss_probability: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AgentConfig::default(),
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(steps) = cli.steps {
        config.route.steps = steps;
    }
    if let Some(probability) = cli.loss_probability {
        config.loss.probability = probability;
    }
    config.validate()?;

    info!("Vehicle agent starting");
    info!("  Coordinator: {}", config.endpoint);
    info!(
        "  Route steps: {}, jitter: {}, loss: p={} policy={:?}",
        config.route.steps, config.route.jitter, config.loss.probability, config.loss.policy
    );

    let listener = CommandListener::new(TcpConnector::new(config.endpoint.clone()), &config);

    match listener.listen_with_retry().await {
        Ok(never) => match never {},
        Err(e) => Err(e).context("listener stopped"),
    }
}
