//! Per-task execution statistics
//!
//! Tracks execution counts, a bounded window of recent errors and
//! durations, and the running average execution time.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default capacity of the rolling error and duration windows
pub const DEFAULT_STATS_WINDOW: usize = 10;

/// A failed execution as kept in the error window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorEntry {
    /// When the failing execution ended
    pub at: DateTime<Utc>,
    /// Rendered error
    pub message: String,
}

/// Execution statistics for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatistics {
    /// Capacity of the rolling windows
    pub window: usize,
    /// Executions started
    pub n_execs: u64,
    /// Executions that completed without error
    pub n_success: u64,
    /// Executions that failed or timed out
    pub n_error: u64,
    /// Most recent errors, oldest first
    pub errors: VecDeque<TaskErrorEntry>,
    /// Most recent execution durations in ms, oldest first
    pub exec_times_ms: VecDeque<u64>,
    /// Sum of all execution durations in ms
    pub total_exec_ms: u64,
    /// Average execution duration in ms over all executions
    pub avg_exec_ms: f64,
    pub last_exec_begin: Option<DateTime<Utc>>,
    pub last_exec_end: Option<DateTime<Utc>>,
    #[serde(skip)]
    current: Option<Instant>,
}

impl Default for TaskStatistics {
    fn default() -> Self {
        Self::with_window(DEFAULT_STATS_WINDOW)
    }
}

impl TaskStatistics {
    /// Create empty statistics keeping `window` recent errors and durations
    pub fn with_window(window: usize) -> Self {
        debug!(window, "TaskStatistics::with_window: called");
        Self {
            window: window.max(1),
            n_execs: 0,
            n_success: 0,
            n_error: 0,
            errors: VecDeque::new(),
            exec_times_ms: VecDeque::new(),
            total_exec_ms: 0,
            avg_exec_ms: 0.0,
            last_exec_begin: None,
            last_exec_end: None,
            current: None,
        }
    }

    /// Record the start of an execution
    pub fn start_exec(&mut self) {
        self.n_execs += 1;
        self.last_exec_begin = Some(Utc::now());
        self.last_exec_end = None;
        self.current = Some(Instant::now());
    }

    /// Record the end of the current execution, with its error if it failed
    ///
    /// Returns the measured duration.
    pub fn end_exec(&mut self, error: Option<String>) -> Duration {
        let elapsed = self.current.take().map(|t| t.elapsed()).unwrap_or_default();
        self.end_exec_with(elapsed, error);
        elapsed
    }

    /// Record the end of an execution that took `elapsed`
    pub fn end_exec_with(&mut self, elapsed: Duration, error: Option<String>) {
        debug!(elapsed_ms = elapsed.as_millis() as u64, failed = error.is_some(), "TaskStatistics::end_exec_with: called");
        let now = Utc::now();

        match error {
            Some(message) => {
                self.n_error += 1;
                push_bounded(&mut self.errors, TaskErrorEntry { at: now, message }, self.window);
            }
            None => {
                self.n_success += 1;
            }
        }

        let elapsed_ms = elapsed.as_millis() as u64;
        self.last_exec_end = Some(now);
        self.current = None;
        push_bounded(&mut self.exec_times_ms, elapsed_ms, self.window);
        self.total_exec_ms += elapsed_ms;
        self.avg_exec_ms = if self.n_execs > 0 {
            self.total_exec_ms as f64 / self.n_execs as f64
        } else {
            elapsed_ms as f64
        };
    }

    /// Time spent so far in the in-flight execution, if any
    pub fn current_exec_time(&self) -> Option<Duration> {
        self.current.map(|t| t.elapsed())
    }

    /// Most recent error message
    pub fn last_error(&self) -> Option<&str> {
        self.errors.back().map(|e| e.message.as_str())
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, item: T, capacity: usize) {
    window.push_back(item);
    while window.len() > capacity {
        window.pop_front();
    }
}
