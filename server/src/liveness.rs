//! Per-vehicle liveness monitor task

use crate::session::SessionRegistry;
use letun_shared::VehicleId;
use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Running monitor owned by the registry entry of its vehicle
#[derive(Debug)]
pub struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor at its next wait point
    pub fn cancel(self) {
        self.token.cancel();
        drop(self.task);
    }
}

/// Polls the registry for one vehicle until cancelled
pub struct LivenessMonitor {
    vehicle_id: VehicleId,
    poll_interval: Duration,
    registry: Weak<SessionRegistry>,
    token: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(vehicle_id: VehicleId, poll_interval: Duration, registry: Weak<SessionRegistry>) -> Self {
        Self {
            vehicle_id,
            poll_interval,
            registry,
            token: CancellationToken::new(),
        }
    }

    /// Spawn the polling loop
    pub fn spawn(self) -> MonitorHandle {
        let token = self.token.clone();
        let task = tokio::spawn(self.run());
        MonitorHandle { token, task }
    }

    async fn run(self) {
        debug!(vehicle_id = %self.vehicle_id, "Monitor running");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }

            // Registry dropped means the coordinator is shutting down
            let Some(registry) = self.registry.upgrade() else {
                break;
            };
            registry.check_liveness(self.vehicle_id, Instant::now()).await;
        }

        debug!(vehicle_id = %self.vehicle_id, "Monitor exited");
    }
}
