//! Inter-poll delay policies.
//!
//! A fixed polling cadence is trivially rate-limited or fingerprinted by the
//! provider, so the production policy draws each interval from a gamma
//! distribution with a hard floor. The policy sits behind a trait so tests
//! (and deployments with different tolerances) can substitute their own
//! timing without touching the job state machine.

use std::time::Duration;

use rand_distr::{Distribution, Gamma};

/// Decides how long to wait between poll cycles.
pub trait DelayPolicy: Send + Sync {
    /// The delay to apply after the given attempt number.
    fn next_delay(&self, attempt: u32) -> Duration;
}

const RESERVE_INTERVAL_SHAPE: f64 = 4.0;
const RESERVE_INTERVAL_SCALE: f64 = 0.25;
const RESERVE_INTERVAL_FLOOR: Duration = Duration::from_millis(250);

/// Gamma-jittered delay: `Gamma(shape, scale) + floor`.
///
/// The default parameters are shape 4, scale 0.25 s, floor 0.25 s — mean
/// ≈ 1.25 s, never below 0.25 s, independent of the attempt number.
#[derive(Debug, Clone)]
pub struct GammaDelay {
    interval: Gamma<f64>,
    floor: Duration,
}

impl Default for GammaDelay {
    fn default() -> Self {
        // The parameters are positive constants; construction cannot fail.
        let interval = Gamma::new(RESERVE_INTERVAL_SHAPE, RESERVE_INTERVAL_SCALE)
            .expect("gamma shape and scale are positive");
        Self {
            interval,
            floor: RESERVE_INTERVAL_FLOOR,
        }
    }
}

impl DelayPolicy for GammaDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        let sampled = self.interval.sample(&mut rand::thread_rng());
        Duration::from_secs_f64(sampled) + self.floor
    }
}

/// A constant delay, mainly for tests and deterministic schedules.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelayPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}
