//! Wire messages exchanged between vehicle agents and the coordinator
//!
//! Every message is a JSON object carrying a `type` tag:
//! ```text
//! {"type":"start","vehicle_id":1,"route":[[51.1284,71.4306],[51.132,71.434]],"flight_id":7}
//! {"type":"telemetry","vehicle_id":1,"flight_id":7,"latitude":51.1284,"longitude":71.4306,
//!  "altitude":110,"speed":14,"timestamp":1718000000.25}
//! {"type":"stop","vehicle_id":1,"flight_id":7,"timestamp":1718000011.5}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a logical vehicle. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VehicleId(u32);

impl VehicleId {
    /// Returns `None` for zero
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for VehicleId {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "vehicle_id must be a positive integer".to_string())
    }
}

impl From<VehicleId> for u32 {
    fn from(id: VehicleId) -> Self {
        id.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque correlation token for one flight of a vehicle.
///
/// Coordinators have issued both numeric and textual ids, so either form is
/// accepted and re-encoded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlightId {
    Number(u64),
    Text(String),
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightId::Number(n) => write!(f, "{}", n),
            FlightId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for FlightId {
    fn from(id: u64) -> Self {
        FlightId::Number(id)
    }
}

/// Geodetic coordinate in degrees, encoded as `[lat, lon]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl From<[f64; 2]> for Waypoint {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<Waypoint> for [f64; 2] {
    fn from(wp: Waypoint) -> Self {
        [wp.latitude, wp.longitude]
    }
}

/// Directive asking an agent to fly a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDirective {
    #[serde(alias = "drone_id")]
    pub vehicle_id: VehicleId,
    pub route: Vec<Waypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_id: Option<FlightId>,
}

/// End of a flight.
///
/// Sent by the coordinator as a directive (no timestamp) and by the agent
/// once its route is exhausted (with timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopMessage {
    #[serde(alias = "drone_id")]
    pub vehicle_id: VehicleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_id: Option<FlightId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// One position report from a vehicle in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(default, alias = "drone_id", skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_id: Option<FlightId>,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres, 100..=120
    pub altitude: u32,
    /// 10..=20
    pub speed: u32,
    /// Wall-clock seconds at send time
    pub timestamp: f64,
}

impl TelemetryRecord {
    pub fn position(&self) -> Waypoint {
        Waypoint::new(self.latitude, self.longitude)
    }
}

/// Every message that can cross the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Start(StartDirective),
    Stop(StopMessage),
    Telemetry(TelemetryRecord),
}

impl Message {
    /// Tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Start(_) => "start",
            Message::Stop(_) => "stop",
            Message::Telemetry(_) => "telemetry",
        }
    }
}
