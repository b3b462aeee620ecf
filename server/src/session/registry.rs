//! Session registry tracking connected peers and per-vehicle liveness

use crate::liveness::{LivenessMonitor, MonitorHandle};
use letun_shared::liveness::{LinkState, LivenessEvent, LivenessTracker};
use letun_shared::{FlightId, Message, TelemetryRecord, VehicleId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifier assigned to each accepted connection
pub type PeerId = u64;

/// Handle to send messages to a connected peer
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub addr: String,
    outbound: mpsc::Sender<Message>,
    /// Cancelled when the registry drops this peer
    closed: CancellationToken,
}

impl PeerHandle {
    pub fn new(addr: impl Into<String>, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            addr: addr.into(),
            outbound,
            closed: CancellationToken::new(),
        }
    }

    /// Fires once the peer has been unregistered
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Point-in-time view of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStatus {
    pub vehicle_id: VehicleId,
    pub state: LinkState,
    pub since_last_seen: Duration,
    pub monitored: bool,
    /// Connected → Lost transitions seen so far
    pub losses: u32,
}

struct VehicleEntry {
    last_seen: Instant,
    tracker: LivenessTracker,
    monitor: Option<MonitorHandle>,
    /// Peer that most recently reported this vehicle
    owner: Option<PeerId>,
    losses: u32,
}

impl VehicleEntry {
    fn new(last_seen: Instant, threshold: Duration) -> Self {
        Self {
            last_seen,
            tracker: LivenessTracker::new(threshold),
            monitor: None,
            owner: None,
            losses: 0,
        }
    }

    fn cancel_monitor(&mut self) -> bool {
        match self.monitor.take() {
            Some(monitor) => {
                monitor.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    peers: HashMap<PeerId, PeerHandle>,
    vehicles: HashMap<VehicleId, VehicleEntry>,
    flights: HashMap<FlightId, VehicleId>,
}

/// Coordinator bookkeeping: peers, per-vehicle recency and monitors.
///
/// All shared state sits behind one lock; monitors only reach it through
/// the methods here.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    next_peer: AtomicU64,
    threshold: Duration,
    poll_interval: Duration,
}

impl SessionRegistry {
    pub fn new(poll_interval: Duration, threshold: Duration) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_peer: AtomicU64::new(0),
            threshold,
            poll_interval,
        }
    }

    /// Register a newly connected peer
    pub async fn register(&self, handle: PeerHandle) -> PeerId {
        let peer_id = self.next_peer.fetch_add(1, Ordering::SeqCst) + 1;
        info!(peer_id, addr = %handle.addr, "Peer registered");
        self.state.write().await.peers.insert(peer_id, handle);
        peer_id
    }

    /// Remove a peer and stop monitoring the vehicles it was reporting
    pub async fn unregister(&self, peer_id: PeerId) {
        let mut state = self.state.write().await;
        if let Some(handle) = state.peers.remove(&peer_id) {
            handle.closed.cancel();
            info!(peer_id, addr = %handle.addr, "Peer unregistered");
        }

        for (vehicle_id, entry) in state.vehicles.iter_mut() {
            if entry.owner == Some(peer_id) {
                entry.owner = None;
                if entry.cancel_monitor() {
                    info!(vehicle_id = %vehicle_id, "Monitoring stopped: connection closed");
                }
            }
        }
    }

    /// Refresh last-seen for a vehicle on inbound telemetry; never moves it backwards
    pub async fn record_message(&self, vehicle_id: VehicleId, peer: Option<PeerId>, at: Instant) {
        let mut state = self.state.write().await;
        let entry = state
            .vehicles
            .entry(vehicle_id)
            .or_insert_with(|| VehicleEntry::new(at, self.threshold));

        entry.last_seen = entry.last_seen.max(at);
        if peer.is_some() {
            entry.owner = peer;
        }
    }

    /// Vehicle a telemetry record belongs to, via its flight if needed
    pub async fn resolve_vehicle(&self, record: &TelemetryRecord) -> Option<VehicleId> {
        if let Some(vehicle_id) = record.vehicle_id {
            return Some(vehicle_id);
        }
        let flight_id = record.flight_id.as_ref()?;
        self.state.read().await.flights.get(flight_id).copied()
    }

    /// Cancel the vehicle's monitor and forget its flights.
    /// Returns whether a monitor was running.
    pub async fn handle_stop(&self, vehicle_id: VehicleId) -> bool {
        let mut state = self.state.write().await;
        state.flights.retain(|_, owner| *owner != vehicle_id);
        let stopped = state
            .vehicles
            .get_mut(&vehicle_id)
            .map(VehicleEntry::cancel_monitor)
            .unwrap_or(false);

        if stopped {
            info!(vehicle_id = %vehicle_id, "Monitoring stopped: flight finished");
        }
        stopped
    }

    /// Start (or restart) liveness monitoring for a vehicle.
    ///
    /// Last-seen is set to now and the link starts out `Connected`. A new
    /// flight id replaces any earlier flight of the same vehicle.
    pub async fn arm_monitor(self: &Arc<Self>, vehicle_id: VehicleId, flight_id: Option<FlightId>) {
        let now = Instant::now();
        let mut state = self.state.write().await;

        if let Some(flight_id) = flight_id {
            state.flights.retain(|_, owner| *owner != vehicle_id);
            state.flights.insert(flight_id, vehicle_id);
        }

        let entry = state
            .vehicles
            .entry(vehicle_id)
            .or_insert_with(|| VehicleEntry::new(now, self.threshold));

        if entry.cancel_monitor() {
            debug!(vehicle_id = %vehicle_id, "Replacing running monitor");
        }
        entry.last_seen = entry.last_seen.max(now);
        entry.tracker.reset();
        entry.monitor = Some(
            LivenessMonitor::new(vehicle_id, self.poll_interval, Arc::downgrade(self)).spawn(),
        );

        info!(vehicle_id = %vehicle_id, threshold = ?self.threshold, "Monitoring started");
    }

    /// Apply the liveness rule for one vehicle at `now`.
    ///
    /// Called by the vehicle's monitor; logs any transition.
    pub async fn check_liveness(&self, vehicle_id: VehicleId, now: Instant) -> Option<LivenessEvent> {
        let event = {
            let mut state = self.state.write().await;
            let entry = state.vehicles.get_mut(&vehicle_id)?;
            let elapsed = now.saturating_duration_since(entry.last_seen);
            let event = entry.tracker.check(elapsed)?;
            if matches!(event, LivenessEvent::Lost { .. }) {
                entry.losses += 1;
            }
            event
        };

        match event {
            LivenessEvent::Lost { elapsed } => {
                warn!(vehicle_id = %vehicle_id, "Connection lost, last message {:.1}s ago", elapsed.as_secs_f64());
            }
            LivenessEvent::Recovered { .. } => {
                info!(vehicle_id = %vehicle_id, "Connection restored");
            }
        }
        Some(event)
    }

    /// Send a message to every registered peer; returns how many accepted it
    pub async fn broadcast(&self, message: &Message) -> usize {
        self.fan_out(message, None).await
    }

    /// Forward a peer's message to every other peer
    pub async fn relay(&self, from: PeerId, message: &Message) -> usize {
        self.fan_out(message, Some(from)).await
    }

    /// Queue without waiting. Peers whose queue is full or closed are
    /// dropped so one stalled reader cannot hold up the others.
    async fn fan_out(&self, message: &Message, except: Option<PeerId>) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();
        {
            let state = self.state.read().await;
            for (peer_id, handle) in &state.peers {
                if Some(*peer_id) == except {
                    continue;
                }
                match handle.outbound.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(peer_id = *peer_id, addr = %handle.addr, "Peer queue full, dropping slow peer");
                        dropped.push(*peer_id);
                    }
                    Err(TrySendError::Closed(_)) => dropped.push(*peer_id),
                }
            }
        }

        for peer_id in dropped {
            self.unregister(peer_id).await;
        }
        delivered
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peers.len()
    }

    /// Whether the vehicle has ever sent telemetry or been dispatched
    pub async fn is_known(&self, vehicle_id: VehicleId) -> bool {
        self.state.read().await.vehicles.contains_key(&vehicle_id)
    }

    #[cfg(test)]
    pub async fn is_monitored(&self, vehicle_id: VehicleId) -> bool {
        self.state
            .read()
            .await
            .vehicles
            .get(&vehicle_id)
            .is_some_and(|entry| entry.monitor.is_some())
    }

    #[cfg(test)]
    pub async fn link_state(&self, vehicle_id: VehicleId) -> Option<LinkState> {
        self.state
            .read()
            .await
            .vehicles
            .get(&vehicle_id)
            .map(|entry| entry.tracker.state())
    }

    #[cfg(test)]
    pub async fn flight_count(&self) -> usize {
        self.state.read().await.flights.len()
    }

    /// Status of every known vehicle, ordered by id
    pub async fn snapshot(&self) -> Vec<VehicleStatus> {
        let now = Instant::now();
        let state = self.state.read().await;
        let mut statuses: Vec<VehicleStatus> = state
            .vehicles
            .iter()
            .map(|(vehicle_id, entry)| VehicleStatus {
                vehicle_id: *vehicle_id,
                state: entry.tracker.state(),
                since_last_seen: now.saturating_duration_since(entry.last_seen),
                monitored: entry.monitor.is_some(),
                losses: entry.losses,
            })
            .collect();
        statuses.sort_by_key(|s| s.vehicle_id);
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use letun_shared::StopMessage;

    const POLL: Duration = Duration::from_secs(1);
    const THRESHOLD: Duration = Duration::from_secs(2);

    fn vehicle(id: u32) -> VehicleId {
        VehicleId::new(id).unwrap()
    }

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(POLL, THRESHOLD))
    }

    fn stop(id: u32) -> Message {
        Message::Stop(StopMessage {
            vehicle_id: vehicle(id),
            flight_id: None,
            timestamp: None,
        })
    }

    async fn losses(registry: &SessionRegistry, id: u32) -> u32 {
        registry
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.vehicle_id == vehicle(id))
            .map(|s| s.losses)
            .unwrap_or(0)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_connected_within_threshold() {
        let registry = registry();
        registry.arm_monitor(vehicle(1), None).await;

        // Polls at 1s and 2s see elapsed <= threshold
        sleep_ms(2500).await;
        assert_eq!(registry.link_state(vehicle(1)).await, Some(LinkState::Connected));
        assert_eq!(losses(&registry, 1).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_reported_exactly_once() {
        let registry = registry();
        registry.arm_monitor(vehicle(1), None).await;

        sleep_ms(3500).await;
        assert_eq!(registry.link_state(vehicle(1)).await, Some(LinkState::Lost));

        sleep_ms(10_000).await;
        assert_eq!(registry.link_state(vehicle(1)).await, Some(LinkState::Lost));
        assert_eq!(losses(&registry, 1).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_message_recovers() {
        let registry = registry();
        registry.arm_monitor(vehicle(1), None).await;

        sleep_ms(3500).await;
        assert_eq!(registry.link_state(vehicle(1)).await, Some(LinkState::Lost));

        registry.record_message(vehicle(1), None, Instant::now()).await;
        sleep_ms(1000).await;
        assert_eq!(registry.link_state(vehicle(1)).await, Some(LinkState::Connected));
        assert_eq!(losses(&registry, 1).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_monitor() {
        let registry = registry();
        registry.arm_monitor(vehicle(2), None).await;
        assert!(registry.is_monitored(vehicle(2)).await);

        assert!(registry.handle_stop(vehicle(2)).await);
        assert!(!registry.is_monitored(vehicle(2)).await);
        assert!(!registry.handle_stop(vehicle(2)).await);

        // Silence well past the threshold produces nothing once stopped
        sleep_ms(10_000).await;
        assert_eq!(registry.link_state(vehicle(2)).await, Some(LinkState::Connected));
        assert_eq!(losses(&registry, 2).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_cancels_owned_monitors() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(8);
        let handle = PeerHandle::new("test", tx);
        let closed = handle.closed();
        let peer = registry.register(handle).await;

        registry.arm_monitor(vehicle(1), None).await;
        registry.arm_monitor(vehicle(2), None).await;
        registry.record_message(vehicle(1), Some(peer), Instant::now()).await;

        registry.unregister(peer).await;
        assert_eq!(registry.peer_count().await, 0);
        assert!(closed.is_cancelled());
        assert!(!registry.is_monitored(vehicle(1)).await);
        assert!(registry.is_monitored(vehicle(2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_seen_never_moves_backwards() {
        let registry = registry();
        let later = Instant::now() + Duration::from_secs(5);
        registry.record_message(vehicle(3), None, later).await;
        registry.record_message(vehicle(3), None, Instant::now()).await;

        assert_eq!(registry.check_liveness(vehicle(3), later + THRESHOLD).await, None);
        assert!(matches!(
            registry.check_liveness(vehicle(3), later + THRESHOLD + Duration::from_millis(1)).await,
            Some(LivenessEvent::Lost { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_creates_unmonitored_entry() {
        let registry = registry();
        assert!(!registry.is_known(vehicle(4)).await);

        registry.record_message(vehicle(4), None, Instant::now()).await;
        assert!(registry.is_known(vehicle(4)).await);
        assert!(!registry.is_monitored(vehicle(4)).await);

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, LinkState::Connected);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_registered_peers() {
        let registry = registry();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let (tx3, rx3) = mpsc::channel(8);
        registry.register(PeerHandle::new("a", tx1)).await;
        let gone = registry.register(PeerHandle::new("b", tx2)).await;
        registry.register(PeerHandle::new("c", tx3)).await;
        registry.unregister(gone).await;
        drop(rx3);

        assert_eq!(registry.broadcast(&stop(1)).await, 1);
        assert_eq!(rx1.recv().await, Some(stop(1)));
        assert!(rx2.try_recv().is_err());
        // The peer whose receiver went away is dropped
        assert_eq!(registry.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_relay_skips_sender() {
        let registry = registry();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let from = registry.register(PeerHandle::new("agent", tx1)).await;
        registry.register(PeerHandle::new("observer", tx2)).await;

        assert_eq!(registry.relay(from, &stop(1)).await, 1);
        assert_eq!(rx2.recv().await, Some(stop(1)));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_peer_dropped_without_blocking() {
        let registry = registry();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = PeerHandle::new("slow", slow_tx);
        let slow_closed = slow.closed();
        registry.register(slow).await;
        registry.register(PeerHandle::new("fast", fast_tx)).await;

        assert_eq!(registry.broadcast(&stop(1)).await, 2);
        // Slow queue is now full; the next broadcast must not wait on it
        assert_eq!(registry.broadcast(&stop(2)).await, 1);
        assert_eq!(registry.peer_count().await, 1);
        assert!(slow_closed.is_cancelled());

        assert_eq!(fast_rx.recv().await, Some(stop(1)));
        assert_eq!(fast_rx.recv().await, Some(stop(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flight_id_resolves_vehicle() {
        let registry = registry();
        registry.arm_monitor(vehicle(7), Some(FlightId::Number(70))).await;

        let record = TelemetryRecord {
            vehicle_id: None,
            flight_id: Some(FlightId::Number(70)),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 100,
            speed: 10,
            timestamp: 0.0,
        };
        assert_eq!(registry.resolve_vehicle(&record).await, Some(vehicle(7)));

        let unknown = TelemetryRecord {
            flight_id: Some(FlightId::Number(71)),
            ..record
        };
        assert_eq!(registry.resolve_vehicle(&unknown).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flight_index_pruned() {
        let registry = registry();
        registry.arm_monitor(vehicle(1), Some(FlightId::Number(1))).await;
        registry.arm_monitor(vehicle(1), Some(FlightId::Number(2))).await;
        registry.arm_monitor(vehicle(2), Some(FlightId::Number(3))).await;
        assert_eq!(registry.flight_count().await, 2);

        registry.handle_stop(vehicle(1)).await;
        assert_eq!(registry.flight_count().await, 1);

        let record = TelemetryRecord {
            vehicle_id: None,
            flight_id: Some(FlightId::Number(2)),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 100,
            speed: 10,
            timestamp: 0.0,
        };
        assert_eq!(registry.resolve_vehicle(&record).await, None);
    }
}
