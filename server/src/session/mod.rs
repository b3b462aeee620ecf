//! Session management for connected peers and tracked vehicles
//!
//! This module handles:
//! - Registering peers and broadcasting directives to them
//! - Per-vehicle last-seen bookkeeping and liveness monitors
//! - Decoding and dispatching inbound peer messages

mod connection;
mod registry;

pub use connection::serve_peer;
pub use registry::SessionRegistry;
#[cfg(test)]
pub use registry::PeerHandle;
