mod command;
mod config;
mod liveness;
mod session;

use anyhow::Context;
use clap::Parser;
use command::{DirectiveDispatcher, OperatorConsole};
use config::ServerConfig;
use session::{serve_peer, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Flight coordinator: dispatches routes and watches vehicle liveness
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    bind: Option<String>,

    /// Seconds of silence before a vehicle is reported lost
    #[arg(long)]
    loss_threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(threshold) = cli.loss_threshold {
        config.loss_threshold_secs = threshold;
    }
    config.validate()?;

    let registry = Arc::new(SessionRegistry::new(config.poll_interval(), config.loss_threshold()));
    let dispatcher = Arc::new(DirectiveDispatcher::new(registry.clone(), &config));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("Coordinator listening on {}", config.bind);
    info!("Commands: <enter> or start [id] | stop <id> | status");

    let console = OperatorConsole::new(dispatcher.clone(), registry.clone());
    tokio::spawn(async move {
        if let Err(e) = console.run(BufReader::new(tokio::io::stdin())).await {
            error!("Operator console failed: {}", e);
        }
    });

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        if let Err(e) = socket.set_nodelay(true) {
            error!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        tokio::spawn(serve_peer(socket, addr.to_string(), registry.clone(), dispatcher.clone()));
    }
}
