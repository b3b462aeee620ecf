//! One emulated flight, from start directive to stop message

use super::loss::{LossModel, LossOutcome};
use super::route::DetailedRoute;
use letun_shared::{now_secs, ranges, FlightId, Message, StopMessage, TelemetryRecord, VehicleId, Waypoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Outbound channel closed")]
    ChannelClosed,
}

/// Summary of a completed flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub vehicle_id: VehicleId,
    pub flight_id: Option<FlightId>,
    pub sent: usize,
    pub skipped: usize,
}

/// Drives one flight over the shared outbound channel
pub struct VehicleSession {
    vehicle_id: VehicleId,
    flight_id: Option<FlightId>,
    route: DetailedRoute,
    loss: LossModel,
    report_interval: Duration,
    rng: StdRng,
}

impl VehicleSession {
    pub fn new(
        vehicle_id: VehicleId,
        flight_id: Option<FlightId>,
        route: DetailedRoute,
        loss: LossModel,
        report_interval: Duration,
    ) -> Self {
        Self {
            vehicle_id,
            flight_id,
            route,
            loss,
            report_interval,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the entropy-seeded RNG
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Report every route point in order, then send the terminal stop.
    ///
    /// Sends go through the connection's single writer, so concurrent
    /// sessions never interleave partial messages.
    pub async fn run(mut self, outbound: mpsc::Sender<Message>) -> Result<SessionReport, SessionError> {
        info!(
            vehicle_id = %self.vehicle_id,
            flight_id = ?self.flight_id,
            points = self.route.len(),
            "Flight started"
        );

        let mut sent = 0;
        let mut skipped = 0;

        for point in self.route.iter() {
            let outcome = self.loss.draw(&mut self.rng);

            if outcome.sends() {
                let record = telemetry(self.vehicle_id, self.flight_id.clone(), *point, &mut self.rng);
                debug!(vehicle_id = %self.vehicle_id, lat = point.latitude, lon = point.longitude, "Telemetry");
                outbound
                    .send(Message::Telemetry(record))
                    .await
                    .map_err(|_| SessionError::ChannelClosed)?;
                sent += 1;
            }

            match outcome {
                LossOutcome::Deliver => {}
                LossOutcome::DeliverThenStall(outage) => {
                    warn!(vehicle_id = %self.vehicle_id, ?outage, "Emulated connection loss, delaying");
                    tokio::time::sleep(outage).await;
                }
                LossOutcome::Skip(outage) => {
                    warn!(vehicle_id = %self.vehicle_id, ?outage, "Emulated connection loss, skipping point");
                    tokio::time::sleep(outage).await;
                    skipped += 1;
                }
            }

            tokio::time::sleep(self.report_interval).await;
        }

        let stop = StopMessage {
            vehicle_id: self.vehicle_id,
            flight_id: self.flight_id.clone(),
            timestamp: Some(now_secs()),
        };
        outbound
            .send(Message::Stop(stop))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        info!(vehicle_id = %self.vehicle_id, sent, skipped, "Flight finished");

        Ok(SessionReport {
            vehicle_id: self.vehicle_id,
            flight_id: self.flight_id,
            sent,
            skipped,
        })
    }
}

fn telemetry<R: Rng + ?Sized>(
    vehicle_id: VehicleId,
    flight_id: Option<FlightId>,
    point: Waypoint,
    rng: &mut R,
) -> TelemetryRecord {
    TelemetryRecord {
        vehicle_id: Some(vehicle_id),
        flight_id,
        latitude: point.latitude,
        longitude: point.longitude,
        altitude: rng.gen_range(ranges::ALTITUDE),
        speed: rng.gen_range(ranges::SPEED),
        timestamp: now_secs(),
    }
}
