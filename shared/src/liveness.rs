//! Vehicle Liveness State Machine
//!
//! Two states, `Connected` and `Lost`, driven by the time elapsed since the
//! coordinator last heard from a vehicle. Each check emits at most one event
//! and only on an actual transition.

use std::time::Duration;

/// Link state of one vehicle as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Connected,
    Lost,
}

/// Transition emitted by a liveness check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LivenessEvent {
    /// Nothing heard for longer than the threshold
    Lost { elapsed: Duration },
    /// Messages resumed after a loss
    Recovered { elapsed: Duration },
}

#[derive(Debug, Clone)]
pub struct LivenessTracker {
    state: LinkState,
    threshold: Duration,
}

impl LivenessTracker {
    /// Create a tracker in the `Connected` state
    pub fn new(threshold: Duration) -> Self {
        Self {
            state: LinkState::Connected,
            threshold,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_lost(&self) -> bool {
        self.state == LinkState::Lost
    }

    /// Evaluate the transition rule for the given time since last message
    pub fn check(&mut self, elapsed: Duration) -> Option<LivenessEvent> {
        match self.state {
            LinkState::Connected if elapsed > self.threshold => {
                self.state = LinkState::Lost;
                Some(LivenessEvent::Lost { elapsed })
            }
            LinkState::Lost if elapsed <= self.threshold => {
                self.state = LinkState::Connected;
                Some(LivenessEvent::Recovered { elapsed })
            }
            _ => None,
        }
    }

    /// Return to `Connected` without emitting an event (re-arm)
    pub fn reset(&mut self) {
        self.state = LinkState::Connected;
    }
}
