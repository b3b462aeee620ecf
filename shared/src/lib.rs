//! Letun Shared Protocol Types
//!
//! This crate provides the wire messages, the line codec and the liveness
//! state machine shared by vehicle agents and the coordinator.

pub mod codec;
pub mod liveness;
pub mod message;

use std::time::{SystemTime, UNIX_EPOCH};

pub use message::*;

/// Get current wall-clock time in seconds since Unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Default timing parameters for the system
pub mod timing {
    use std::time::Duration;

    /// Interval between telemetry reports of one flight
    pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Fixed delay between agent reconnect attempts
    pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

    /// How often a liveness monitor checks its vehicle
    pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Silence longer than this marks a vehicle as lost
    pub const LIVENESS_THRESHOLD: Duration = Duration::from_secs(2);

    /// Duration of an emulated outage
    pub const OUTAGE_DURATION: Duration = Duration::from_secs(5);
}

/// Telemetry value ranges reported by emulated vehicles
pub mod ranges {
    use std::ops::RangeInclusive;

    /// Altitude in metres
    pub const ALTITUDE: RangeInclusive<u32> = 100..=120;

    /// Speed
    pub const SPEED: RangeInclusive<u32> = 10..=20;
}
