//! Task engine error types

use std::time::Duration;
use thiserror::Error;

/// Errors raised by task construction, registration and execution
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No task registered as {0}")]
    NotFound(String),

    #[error("Task {0} is already registered")]
    Duplicate(String),

    #[error("Task {0} is already started")]
    AlreadyStarted(String),

    #[error("Task {0} was stopped and cannot be restarted")]
    Stopped(String),

    #[error("Workload timed out after {0:?}")]
    Timeout(Duration),

    #[error("Workload failed: {0}")]
    Workload(String),
}
