//! Directive dispatcher for starting and stopping vehicle flights

use crate::config::ServerConfig;
use crate::session::SessionRegistry;
use letun_shared::{now_secs, FlightId, Message, StartDirective, StopMessage, VehicleId, Waypoint};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a dispatched directive
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub vehicle_id: VehicleId,
    pub flight_id: Option<FlightId>,
    /// Number of peers the directive was queued for
    pub delivered: usize,
}

/// Builds directives, broadcasts them and arms liveness monitoring
pub struct DirectiveDispatcher {
    registry: Arc<SessionRegistry>,
    flight_seq: AtomicU64,
    pool_cursor: AtomicUsize,
    pool: Vec<VehicleId>,
    route_template: Vec<Waypoint>,
    route_offset_step: f64,
}

impl DirectiveDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Self {
        Self {
            registry,
            flight_seq: AtomicU64::new(0),
            pool_cursor: AtomicUsize::new(0),
            pool: config.vehicle_pool.clone(),
            route_template: config.route_template.clone(),
            route_offset_step: config.route_offset_step,
        }
    }

    pub fn next_flight_id(&self) -> FlightId {
        FlightId::Number(self.flight_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// First pool vehicle never seen, otherwise rotate through the pool
    pub async fn select_vehicle(&self) -> Option<VehicleId> {
        for vehicle_id in &self.pool {
            if !self.registry.is_known(*vehicle_id).await {
                return Some(*vehicle_id);
            }
        }
        if self.pool.is_empty() {
            return None;
        }
        let cursor = self.pool_cursor.fetch_add(1, Ordering::SeqCst);
        Some(self.pool[cursor % self.pool.len()])
    }

    /// Template route shifted by the vehicle id
    pub fn route_for(&self, vehicle_id: VehicleId) -> Vec<Waypoint> {
        let offset = f64::from(vehicle_id.get()) * self.route_offset_step;
        self.route_template
            .iter()
            .map(|p| Waypoint::new(p.latitude + offset, p.longitude + offset))
            .collect()
    }

    /// Operator trigger: start a flight for `requested` or a selected vehicle
    pub async fn dispatch_start(&self, requested: Option<VehicleId>) -> Option<DispatchReceipt> {
        let vehicle_id = match requested {
            Some(id) => id,
            None => self.select_vehicle().await?,
        };

        let directive = StartDirective {
            vehicle_id,
            route: self.route_for(vehicle_id),
            flight_id: Some(self.next_flight_id()),
        };
        Some(self.send_start(directive).await)
    }

    /// Forward a start directive received from a peer
    pub async fn relay_start(&self, mut directive: StartDirective) -> DispatchReceipt {
        if directive.flight_id.is_none() {
            directive.flight_id = Some(self.next_flight_id());
        }
        self.send_start(directive).await
    }

    async fn send_start(&self, directive: StartDirective) -> DispatchReceipt {
        let vehicle_id = directive.vehicle_id;
        let flight_id = directive.flight_id.clone();
        let waypoints = directive.route.len();

        let delivered = self.registry.broadcast(&Message::Start(directive)).await;
        if delivered == 0 {
            warn!(vehicle_id = %vehicle_id, "No peers connected, directive not delivered");
        }
        info!(
            vehicle_id = %vehicle_id,
            flight_id = ?flight_id,
            waypoints,
            delivered,
            "Start directive dispatched"
        );

        self.registry.arm_monitor(vehicle_id, flight_id.clone()).await;

        DispatchReceipt {
            vehicle_id,
            flight_id,
            delivered,
        }
    }

    /// Operator stop: tell peers and stop monitoring
    pub async fn dispatch_stop(&self, vehicle_id: VehicleId) -> DispatchReceipt {
        let stop = StopMessage {
            vehicle_id,
            flight_id: None,
            timestamp: Some(now_secs()),
        };
        let delivered = self.registry.broadcast(&Message::Stop(stop)).await;
        self.registry.handle_stop(vehicle_id).await;

        info!(vehicle_id = %vehicle_id, delivered, "Stop dispatched");

        DispatchReceipt {
            vehicle_id,
            flight_id: None,
            delivered,
        }
    }
}
