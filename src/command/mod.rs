//! Directive handling for the vehicle agent
//!
//! This module handles:
//! - Validating start directives and their routes
//! - Spawning one tracked flight session per start directive
//! - Observing coordinator stop directives

mod executor;

pub use executor::{DirectiveExecutor, DirectiveResult, SessionSet};
