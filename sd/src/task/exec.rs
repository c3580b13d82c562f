//! Execution wrapper: one cycle of a workload with timeout and statistics

use std::sync::RwLock;
use std::time::Duration;

use tracing::{debug, error};

use super::error::TaskError;
use super::stats::TaskStatistics;
use super::task::{CycleOutcome, Workload};

/// Run one cycle of `workload`, bounded by `timeout`
///
/// Never fails: errors and timeouts are logged and recorded in `stats`, and
/// `None` is returned so the caller's loop carries on. On timeout the
/// workload future is dropped, cancelling it at its current await point.
pub(crate) async fn execute(
    task_id: &str,
    timeout: Duration,
    workload: &mut dyn Workload,
    stats: &RwLock<TaskStatistics>,
) -> Option<CycleOutcome> {
    debug!(%task_id, ?timeout, "execute: called");
    if let Ok(mut s) = stats.write() {
        s.start_exec();
    }

    let result = match tokio::time::timeout(timeout, workload.run()).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(TaskError::Workload(format!("{:#}", e))),
        Err(_) => Err(TaskError::Timeout(timeout)),
    };

    match result {
        Ok(outcome) => {
            let elapsed = stats.write().map(|mut s| s.end_exec(None)).unwrap_or_default();
            debug!(%task_id, elapsed_ms = elapsed.as_millis() as u64, "execute: cycle succeeded");
            Some(outcome)
        }
        Err(e) => {
            error!(%task_id, error = %e, "Exception in task");
            if let Ok(mut s) = stats.write() {
                s.end_exec(Some(e.to_string()));
            }
            None
        }
    }
}
