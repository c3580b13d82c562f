//! Scheduling policies
//!
//! - [`SelfRegulating`]: the workload picks its own next deadline; without one
//!   the task waits [`DEFAULT_NEXT_DELAY`]
//! - [`FuzzyPeriodic`]: a fixed period with jitter, sleep drawn uniformly from
//!   `[0.67 * period, 1.33 * period)`. The sleep runs concurrently with the
//!   workload, so a cycle lasts `max(sleep, workload)`. Tasks started together
//!   drift apart over time instead of firing in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::TaskError;

/// Delay used by self-regulating tasks whose workload set no deadline
pub const DEFAULT_NEXT_DELAY: Duration = Duration::from_secs(30);

/// Lower bound of a fuzzy sleep, as a fraction of the period
const FUZZ_BASE: f64 = 0.67;

/// Width of the random part of a fuzzy sleep, as a fraction of the period
const FUZZ_SPREAD: f64 = 2.0 / 3.0;

/// Initial delay before the first cycle, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FirstDelay {
    /// Always wait exactly this long
    Fixed(u64),
    /// Wait a duration drawn once, uniformly, from `[lo, hi]`
    Range([u64; 2]),
}

impl FirstDelay {
    /// Resolve to a concrete delay, drawing from the range if needed
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Duration, TaskError> {
        match *self {
            FirstDelay::Fixed(secs) => Ok(Duration::from_secs(secs)),
            FirstDelay::Range([lo, hi]) => {
                if lo > hi {
                    return Err(TaskError::Configuration(format!(
                        "first_delay range [{}, {}] is inverted",
                        lo, hi
                    )));
                }
                Ok(Duration::from_secs(rng.random_range(lo..=hi)))
            }
        }
    }
}

/// Configuration for a [`SelfRegulating`] policy
#[derive(Debug, Clone, Default)]
pub struct SelfRegulatingConfig {
    pub first_delay: Option<Duration>,
}

/// Configuration for a [`FuzzyPeriodic`] policy
#[derive(Debug, Clone, Default)]
pub struct FuzzyPeriodicConfig {
    /// Required, must be positive
    pub period: Option<Duration>,
    pub first_delay: Option<FirstDelay>,
}

/// The task decides its own next run
#[derive(Debug, Clone)]
pub struct SelfRegulating {
    first_delay: Option<Duration>,
}

impl SelfRegulating {
    pub fn new(config: SelfRegulatingConfig) -> Self {
        debug!(?config, "SelfRegulating::new: called");
        Self {
            first_delay: config.first_delay.filter(|d| !d.is_zero()),
        }
    }

    /// How long to sleep after a cycle that asked for `deadline`
    pub fn next_sleep(&self, deadline: Option<tokio::time::Instant>, now: tokio::time::Instant) -> Duration {
        match deadline {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => DEFAULT_NEXT_DELAY,
        }
    }
}

/// Fixed period with self-stabilizing jitter
#[derive(Debug, Clone)]
pub struct FuzzyPeriodic {
    period: Duration,
    first_delay: Option<Duration>,
}

impl FuzzyPeriodic {
    /// Validate the configuration and draw the first delay
    pub fn new(config: FuzzyPeriodicConfig) -> Result<Self, TaskError> {
        debug!(?config, "FuzzyPeriodic::new: called");
        let period = match config.period {
            Some(p) if !p.is_zero() => p,
            Some(_) => {
                debug!("FuzzyPeriodic::new: zero period");
                return Err(TaskError::Configuration("period must be positive".to_string()));
            }
            None => {
                debug!("FuzzyPeriodic::new: missing period");
                return Err(TaskError::Configuration(
                    "fuzzy periodic task requires a period".to_string(),
                ));
            }
        };

        let first_delay = match config.first_delay {
            Some(fd) => Some(fd.resolve(&mut rand::rng())?).filter(|d| !d.is_zero()),
            None => None,
        };

        Ok(Self { period, first_delay })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Draw the sleep for the next cycle
    pub fn next_sleep<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        fuzzy_sleep_duration(self.period, rng)
    }
}

/// `period * 0.67 + uniform(0, period * 2/3)`
pub fn fuzzy_sleep_duration<R: Rng + ?Sized>(period: Duration, rng: &mut R) -> Duration {
    period.mul_f64(FUZZ_BASE) + period.mul_f64(rng.random_range(0.0..FUZZ_SPREAD))
}

/// When a task's next cycle runs
#[derive(Debug, Clone)]
pub enum SchedulingPolicy {
    SelfRegulating(SelfRegulating),
    FuzzyPeriodic(FuzzyPeriodic),
}

impl SchedulingPolicy {
    pub fn self_regulating(config: SelfRegulatingConfig) -> Self {
        SchedulingPolicy::SelfRegulating(SelfRegulating::new(config))
    }

    pub fn fuzzy_periodic(config: FuzzyPeriodicConfig) -> Result<Self, TaskError> {
        Ok(SchedulingPolicy::FuzzyPeriodic(FuzzyPeriodic::new(config)?))
    }

    /// Delay before the first cycle
    pub fn first_delay(&self) -> Option<Duration> {
        match self {
            SchedulingPolicy::SelfRegulating(p) => p.first_delay,
            SchedulingPolicy::FuzzyPeriodic(p) => p.first_delay,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchedulingPolicy::SelfRegulating(_) => "self-regulating",
            SchedulingPolicy::FuzzyPeriodic(_) => "fuzzy-periodic",
        }
    }
}
