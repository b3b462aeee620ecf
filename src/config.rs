//! Agent configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none at all) yields a working agent.
//!
//! ```toml
//! endpoint = "tcp://127.0.0.1:8080"
//! reconnect_backoff_secs = 5.0
//! report_interval_secs = 1.0
//! on_decode_error = "skip"
//!
//! [route]
//! steps = 10
//! jitter = 0.0
//!
//! [loss]
//! probability = 0.1
//! outage_secs = 5.0
//! policy = "resend_after_delay"
//! ```

use crate::flight::{Interpolator, LossModel, LossPolicy};
use crate::transport::tcp::parse_endpoint;
use letun_shared::timing;
use serde::Deserialize;
use std::num::NonZeroUsize;
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

/// What to do with an inbound line that does not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Log and continue with the next line
    #[default]
    Skip,
    /// Treat as a transport failure and reconnect
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    pub steps: usize,
    pub jitter: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossConfig {
    pub probability: f64,
    pub outage_secs: f64,
    pub policy: LossPolicy,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            probability: 0.1,
            outage_secs: timing::OUTAGE_DURATION.as_secs_f64(),
            policy: LossPolicy::ResendAfterDelay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Coordinator endpoint, `tcp://host:port` or `host:port`
    pub endpoint: String,
    pub reconnect_backoff_secs: f64,
    pub report_interval_secs: f64,
    pub on_decode_error: DecodePolicy,
    pub route: RouteConfig,
    pub loss: LossConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:8080".into(),
            reconnect_backoff_secs: timing::RECONNECT_BACKOFF.as_secs_f64(),
            report_interval_secs: timing::REPORT_INTERVAL.as_secs_f64(),
            on_decode_error: DecodePolicy::default(),
            route: RouteConfig::default(),
            loss: LossConfig::default(),
        }
    }
}

impl AgentConfig {
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
        parse_endpoint(&self.endpoint).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.route.steps == 0 {
            return Err(ConfigError::Invalid("route.steps must be at least 1".into()));
        }
        if !(self.route.jitter.is_finite() && self.route.jitter >= 0.0) {
            return Err(ConfigError::Invalid("route.jitter must be a non-negative number".into()));
        }
        if !(0.0..=1.0).contains(&self.loss.probability) {
            return Err(ConfigError::Invalid("loss.probability must be within [0, 1]".into()));
        }
        for (name, secs) in [
            ("reconnect_backoff_secs", self.reconnect_backoff_secs),
            ("report_interval_secs", self.report_interval_secs),
            ("loss.outage_secs", self.loss.outage_secs),
        ] {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative number", name)))?;
        }
        if self.reconnect_backoff_secs == 0.0 {
            return Err(ConfigError::Invalid("reconnect_backoff_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn reconnect_backoff(&self) -> Duration {
        secs(self.reconnect_backoff_secs)
    }

    pub fn report_interval(&self) -> Duration {
        secs(self.report_interval_secs)
    }

    pub fn interpolator(&self) -> Interpolator {
        Interpolator::new(NonZeroUsize::new(self.route.steps).unwrap_or(NonZeroUsize::MIN), self.route.jitter)
    }

    pub fn loss_model(&self) -> LossModel {
        LossModel::new(self.loss.probability, secs(self.loss.outage_secs), self.loss.policy)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
