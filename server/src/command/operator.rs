//! Operator console: line commands that trigger directives

use super::dispatcher::DirectiveDispatcher;
use crate::session::SessionRegistry;
use letun_shared::VehicleId;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid vehicle id: {0}")]
    InvalidVehicle(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Start a flight; picks a vehicle from the pool when none is given
    Start(Option<VehicleId>),
    Stop(VehicleId),
    Status,
}

impl OperatorCommand {
    /// Parse one console line. An empty line means `start`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Self::Start(None));
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(ParseError::Usage("start [id] | stop <id> | status"));
        }

        match (verb.to_ascii_lowercase().as_str(), arg) {
            ("start", None) => Ok(Self::Start(None)),
            ("start", Some(id)) => Ok(Self::Start(Some(parse_vehicle(id)?))),
            ("stop", Some(id)) => Ok(Self::Stop(parse_vehicle(id)?)),
            ("stop", None) => Err(ParseError::Usage("stop <id>")),
            ("status", None) => Ok(Self::Status),
            (other, _) => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_vehicle(text: &str) -> Result<VehicleId, ParseError> {
    text.parse::<u32>()
        .ok()
        .and_then(VehicleId::new)
        .ok_or_else(|| ParseError::InvalidVehicle(text.to_string()))
}

/// Reads operator commands until the input closes
pub struct OperatorConsole {
    dispatcher: Arc<DirectiveDispatcher>,
    registry: Arc<SessionRegistry>,
}

impl OperatorConsole {
    pub fn new(dispatcher: Arc<DirectiveDispatcher>, registry: Arc<SessionRegistry>) -> Self {
        Self { dispatcher, registry }
    }

    pub async fn run<R: AsyncBufRead + Unpin>(&self, input: R) -> std::io::Result<()> {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            match OperatorCommand::parse(&line) {
                Ok(command) => self.execute(command).await,
                Err(e) => warn!("{}", e),
            }
        }
        info!("Operator input closed");
        Ok(())
    }

    pub async fn execute(&self, command: OperatorCommand) {
        match command {
            OperatorCommand::Start(requested) => match self.dispatcher.dispatch_start(requested).await {
                Some(receipt) => info!(
                    vehicle_id = %receipt.vehicle_id,
                    flight_id = ?receipt.flight_id,
                    peers = receipt.delivered,
                    "Operator start"
                ),
                None => warn!("No vehicle available to start"),
            },
            OperatorCommand::Stop(vehicle_id) => {
                let receipt = self.dispatcher.dispatch_stop(vehicle_id).await;
                info!(vehicle_id = %receipt.vehicle_id, peers = receipt.delivered, "Operator stop");
            }
            OperatorCommand::Status => info!("{}", self.status_report().await),
        }
    }

    async fn status_report(&self) -> String {
        let vehicles = self.registry.snapshot().await;
        let mut report = format!("{} peer(s), {} vehicle(s)", self.registry.peer_count().await, vehicles.len());
        for status in vehicles {
            let _ = write!(
                report,
                "\n  vehicle {}: {:?}, last seen {:.1}s ago, {} loss(es){}",
                status.vehicle_id,
                status.state,
                status.since_last_seen.as_secs_f64(),
                status.losses,
                if status.monitored { ", monitored" } else { "" }
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn vehicle(id: u32) -> VehicleId {
        VehicleId::new(id).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(OperatorCommand::parse(""), Ok(OperatorCommand::Start(None)));
        assert_eq!(OperatorCommand::parse("  start "), Ok(OperatorCommand::Start(None)));
        assert_eq!(OperatorCommand::parse("start 2"), Ok(OperatorCommand::Start(Some(vehicle(2)))));
        assert_eq!(OperatorCommand::parse("STOP 1"), Ok(OperatorCommand::Stop(vehicle(1))));
        assert_eq!(OperatorCommand::parse("status"), Ok(OperatorCommand::Status));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(OperatorCommand::parse("launch"), Err(ParseError::UnknownCommand(_))));
        assert!(matches!(OperatorCommand::parse("start 0"), Err(ParseError::InvalidVehicle(_))));
        assert!(matches!(OperatorCommand::parse("stop x"), Err(ParseError::InvalidVehicle(_))));
        assert!(matches!(OperatorCommand::parse("stop"), Err(ParseError::Usage(_))));
        assert!(matches!(OperatorCommand::parse("start 1 2"), Err(ParseError::Usage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_drives_dispatcher() {
        let config = ServerConfig::default();
        let registry = Arc::new(SessionRegistry::new(config.poll_interval(), config.loss_threshold()));
        let dispatcher = Arc::new(DirectiveDispatcher::new(registry.clone(), &config));
        let console = OperatorConsole::new(dispatcher, registry.clone());

        let input: &[u8] = b"\nstart 2\nbogus\nstop 1\nstatus\n";
        console.run(input).await.unwrap();

        assert!(!registry.is_monitored(vehicle(1)).await);
        assert!(registry.is_monitored(vehicle(2)).await);
        assert!(console.status_report().await.contains("vehicle 2"));
    }
}
