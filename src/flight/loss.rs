//! Connection loss emulation
//!
//! Before each report a vehicle consults the model, which draws an
//! independent outage with probability `p`.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// How an emulated outage affects the current point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossPolicy {
    /// Send the point, then stall for the outage duration
    #[default]
    ResendAfterDelay,
    /// Stall for the outage duration and drop the point
    SkipOnLoss,
}

/// What the session should do with the current point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossOutcome {
    /// Send normally
    Deliver,
    /// Send, then sleep for the given outage
    DeliverThenStall(Duration),
    /// Sleep for the given outage and do not send
    Skip(Duration),
}

impl LossOutcome {
    pub fn sends(&self) -> bool {
        !matches!(self, LossOutcome::Skip(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossModel {
    /// Per-point outage probability in [0, 1]
    pub probability: f64,
    pub outage: Duration,
    pub policy: LossPolicy,
}

impl LossModel {
    pub fn new(probability: f64, outage: Duration, policy: LossPolicy) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            probability,
            outage,
            policy,
        }
    }

    /// Never emulates an outage
    pub fn disabled() -> Self {
        Self::new(0.0, Duration::ZERO, LossPolicy::default())
    }

    /// Draw the outcome for one point
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> LossOutcome {
        if self.probability <= 0.0 || !rng.gen_bool(self.probability) {
            return LossOutcome::Deliver;
        }

        match self.policy {
            LossPolicy::ResendAfterDelay => LossOutcome::DeliverThenStall(self.outage),
            LossPolicy::SkipOnLoss => LossOutcome::Skip(self.outage),
        }
    }
}

impl Default for LossModel {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn outage_rate(model: &LossModel, trials: usize, seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let outages = (0..trials).filter(|_| model.draw(&mut rng) != LossOutcome::Deliver).count();
        outages as f64 / trials as f64
    }

    #[test]
    fn test_rate_converges_to_probability() {
        for p in [0.1, 0.2, 0.5] {
            let model = LossModel::new(p, Duration::from_secs(5), LossPolicy::SkipOnLoss);
            let rate = outage_rate(&model, 100_000, 42);
            assert!((rate - p).abs() < 0.01, "p={} rate={}", p, rate);
        }
    }

    #[test]
    fn test_policy_selects_outcome() {
        let outage = Duration::from_secs(5);
        let mut rng = StdRng::seed_from_u64(3);

        let resend = LossModel::new(1.0, outage, LossPolicy::ResendAfterDelay);
        assert_eq!(resend.draw(&mut rng), LossOutcome::DeliverThenStall(outage));
        assert!(resend.draw(&mut rng).sends());

        let skip = LossModel::new(1.0, outage, LossPolicy::SkipOnLoss);
        assert_eq!(skip.draw(&mut rng), LossOutcome::Skip(outage));
        assert!(!skip.draw(&mut rng).sends());
    }

    #[test]
    fn test_disabled_never_stalls() {
        assert_eq!(outage_rate(&LossModel::disabled(), 10_000, 1), 0.0);
    }

    #[test]
    fn test_probability_clamped() {
        assert_eq!(LossModel::new(3.0, Duration::ZERO, LossPolicy::SkipOnLoss).probability, 1.0);
        assert_eq!(LossModel::new(-1.0, Duration::ZERO, LossPolicy::SkipOnLoss).probability, 0.0);
    }
}
