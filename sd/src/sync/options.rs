//! Per-channel sync options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::{FirstDelay, FuzzyPeriodicConfig, SchedulingPolicy, TaskError};

/// Recognized options of a channel's sync task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncOptions {
    /// Seconds between cycles, before jitter
    pub period: u64,

    /// Seconds before the first cycle, fixed or `[lo, hi]`
    pub first_delay: Option<FirstDelay>,

    /// Seconds a single cycle may take
    pub timeout: u64,

    /// Base number of stories pulled per cycle
    pub chunk_size: usize,

    /// Stories smaller than this are never published
    pub min_cluster_size: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            period: 60,
            first_delay: Some(FirstDelay::Range([0, 15])),
            timeout: 300,
            chunk_size: 24,
            min_cluster_size: 2,
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.period == 0 {
            return Err(TaskError::Configuration("period must be positive".to_string()));
        }
        if self.timeout == 0 {
            return Err(TaskError::Configuration("timeout must be positive".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(TaskError::Configuration("chunk-size must be positive".to_string()));
        }
        if let Some(FirstDelay::Range([lo, hi])) = self.first_delay
            && lo > hi
        {
            return Err(TaskError::Configuration(format!(
                "first-delay range [{}, {}] is inverted",
                lo, hi
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Build the fuzzy periodic policy these options describe
    pub fn policy(&self) -> Result<SchedulingPolicy, TaskError> {
        self.validate()?;
        SchedulingPolicy::fuzzy_periodic(FuzzyPeriodicConfig {
            period: Some(Duration::from_secs(self.period)),
            first_delay: self.first_delay,
        })
    }
}
