//! Flight emulation for the vehicle agent
//!
//! This module handles:
//! - Expanding sparse routes into dense report positions
//! - Emulating connectivity loss per report
//! - Streaming telemetry and the terminal stop for one flight

mod loss;
mod route;
mod session;

pub use loss::{LossModel, LossPolicy};
pub use route::{Interpolator, Route};
pub use session::{SessionError, SessionReport, VehicleSession};
