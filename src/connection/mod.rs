//! Connection management for the coordinator link
//!
//! This module handles:
//! - Persistent connection with fixed-backoff reconnection
//! - Decoding inbound directives and spawning flights
//! - Serializing outbound messages through a single writer

mod listener;

pub use listener::CommandListener;
