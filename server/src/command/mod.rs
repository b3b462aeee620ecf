//! Directive dispatch and the operator console
//!
//! This module handles:
//! - Building start/stop directives and choosing vehicles
//! - Arming and disarming liveness monitoring on dispatch
//! - Parsing operator console commands

mod dispatcher;
mod operator;

pub use dispatcher::DirectiveDispatcher;
pub use operator::OperatorConsole;
