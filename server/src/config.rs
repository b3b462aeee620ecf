//! Coordinator configuration
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! poll_interval_secs = 1.0
//! loss_threshold_secs = 2.0
//! vehicle_pool = [1, 2]
//! route_offset_step = 0.004
//! route_template = [[51.1284, 71.4306], [51.1300, 71.4320], [51.1320, 71.4340]]
//! ```

use letun_shared::{timing, VehicleId, Waypoint};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub poll_interval_secs: f64,
    pub loss_threshold_secs: f64,
    /// Vehicles the operator picks from when no id is given
    pub vehicle_pool: Vec<VehicleId>,
    /// Base route; each vehicle gets it shifted by `id * route_offset_step`
    pub route_template: Vec<Waypoint>,
    pub route_offset_step: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            poll_interval_secs: timing::LIVENESS_POLL_INTERVAL.as_secs_f64(),
            loss_threshold_secs: timing::LIVENESS_THRESHOLD.as_secs_f64(),
            vehicle_pool: [1, 2].into_iter().filter_map(VehicleId::new).collect(),
            route_template: vec![
                Waypoint::new(51.1284, 71.4306),
                Waypoint::new(51.1300, 71.4320),
                Waypoint::new(51.1320, 71.4340),
            ],
            route_offset_step: 0.004,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("loss_threshold_secs", self.loss_threshold_secs),
        ] {
            let duration = Duration::try_from_secs_f64(secs)
                .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative number", name)))?;
            if duration.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if self.vehicle_pool.is_empty() {
            return Err(ConfigError::Invalid("vehicle_pool must not be empty".into()));
        }
        if self.route_template.is_empty() {
            return Err(ConfigError::Invalid("route_template must not be empty".into()));
        }
        if !self.route_template.iter().all(Waypoint::is_finite) || !self.route_offset_step.is_finite() {
            return Err(ConfigError::Invalid("route coordinates must be finite".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn loss_threshold(&self) -> Duration {
        secs(self.loss_threshold_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
