//! Directive executor - validates and dispatches incoming directives

use crate::flight::{Interpolator, LossModel, Route, SessionError, SessionReport, VehicleSession};
use letun_shared::{FlightId, Message, StartDirective, StopMessage, VehicleId};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Flights running over one connection
pub type SessionSet = JoinSet<Result<SessionReport, SessionError>>;

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveResult {
    /// A flight session was spawned
    FlightStarted {
        vehicle_id: VehicleId,
        flight_id: Option<FlightId>,
        points: usize,
    },
    /// Start directive rejected (invalid route)
    Rejected { vehicle_id: VehicleId, message: String },
    /// Informational message, no action taken
    Observed,
}

/// Executes directives received from the coordinator
pub struct DirectiveExecutor {
    interpolator: Interpolator,
    loss: LossModel,
    report_interval: Duration,
}

impl DirectiveExecutor {
    pub fn new(interpolator: Interpolator, loss: LossModel, report_interval: Duration) -> Self {
        Self {
            interpolator,
            loss,
            report_interval,
        }
    }

    /// Handle one decoded message, spawning into `sessions` on start
    pub fn execute(
        &self,
        message: Message,
        outbound: &mpsc::Sender<Message>,
        sessions: &mut SessionSet,
    ) -> DirectiveResult {
        match message {
            Message::Start(start) => self.start_flight(start, outbound, sessions),
            Message::Stop(stop) => observe_stop(&stop),
            Message::Telemetry(tel) => {
                debug!(vehicle_id = ?tel.vehicle_id, "Ignoring telemetry from coordinator");
                DirectiveResult::Observed
            }
        }
    }

    fn start_flight(
        &self,
        start: StartDirective,
        outbound: &mpsc::Sender<Message>,
        sessions: &mut SessionSet,
    ) -> DirectiveResult {
        let route = match Route::new(start.route) {
            Ok(route) => route,
            Err(e) => {
                warn!(vehicle_id = %start.vehicle_id, error = %e, "Rejected start directive");
                return DirectiveResult::Rejected {
                    vehicle_id: start.vehicle_id,
                    message: e.to_string(),
                };
            }
        };

        let detailed = self.interpolator.interpolate(&route, &mut rand::thread_rng());
        let points = detailed.len();

        info!(
            vehicle_id = %start.vehicle_id,
            flight_id = ?start.flight_id,
            waypoints = route.waypoints().len(),
            points,
            "Start directive received"
        );

        let session = VehicleSession::new(
            start.vehicle_id,
            start.flight_id.clone(),
            detailed,
            self.loss,
            self.report_interval,
        );
        sessions.spawn(session.run(outbound.clone()));

        DirectiveResult::FlightStarted {
            vehicle_id: start.vehicle_id,
            flight_id: start.flight_id,
            points,
        }
    }
}

fn observe_stop(stop: &StopMessage) -> DirectiveResult {
    info!(vehicle_id = %stop.vehicle_id, flight_id = ?stop.flight_id, "Received stop directive");
    DirectiveResult::Observed
}
