//! Task - a workload driven forever by a scheduling policy
//!
//! Lifecycle: `Created -> Running -> Stopped`. Stopping is terminal.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TaskError;
use super::exec::execute;
use super::policy::SchedulingPolicy;
use super::stats::TaskStatistics;

/// Default bound on a single workload execution
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// What a successful cycle reports back to its scheduling loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// When a self-regulating task wants to run next
    pub next_deadline: Option<Instant>,
}

impl CycleOutcome {
    pub fn run_again_at(deadline: Instant) -> Self {
        Self {
            next_deadline: Some(deadline),
        }
    }

    pub fn run_again_in(delay: Duration) -> Self {
        Self::run_again_at(Instant::now() + delay)
    }
}

/// The unit of work a task performs once per cycle
#[async_trait]
pub trait Workload: Send {
    async fn run(&mut self) -> eyre::Result<CycleOutcome>;
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Running,
    Stopped,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A recurrent task
pub struct Task {
    id: String,
    timeout: Duration,
    policy: SchedulingPolicy,
    /// Moved into the loop on start
    workload: Option<Box<dyn Workload>>,
    stats: Arc<RwLock<TaskStatistics>>,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Task {
    /// Create a task in the `Created` state
    pub fn new(id: impl Into<String>, policy: SchedulingPolicy, workload: impl Workload + 'static) -> Self {
        let id = id.into();
        debug!(%id, policy = policy.name(), "Task::new: called");
        Self {
            id,
            timeout: DEFAULT_TASK_TIMEOUT,
            policy,
            workload: Some(Box::new(workload)),
            stats: Arc::new(RwLock::new(TaskStatistics::default())),
            state: TaskState::Created,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Bound each execution of the workload by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Snapshot of the execution statistics
    pub fn statistics(&self) -> TaskStatistics {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Spawn the scheduling loop on the current runtime
    pub fn start(&mut self) -> Result<(), TaskError> {
        debug!(id = %self.id, state = %self.state, "Task::start: called");
        match self.state {
            TaskState::Running => return Err(TaskError::AlreadyStarted(self.id.clone())),
            TaskState::Stopped => return Err(TaskError::Stopped(self.id.clone())),
            TaskState::Created => {}
        }

        let workload = self
            .workload
            .take()
            .ok_or_else(|| TaskError::AlreadyStarted(self.id.clone()))?;

        let ctx = LoopContext {
            id: self.id.clone(),
            timeout: self.timeout,
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
        };
        self.handle = Some(tokio::spawn(run_loop(ctx, self.policy.clone(), workload)));
        self.state = TaskState::Running;

        info!(id = %self.id, policy = self.policy.name(), "Task started");
        Ok(())
    }

    /// Stop a running task; returns whether the state changed
    ///
    /// The loop exits at its next wait. An in-flight workload is allowed to
    /// finish (or time out).
    pub fn stop(&mut self) -> bool {
        debug!(id = %self.id, state = %self.state, "Task::stop: called");
        if self.state != TaskState::Running {
            debug!(id = %self.id, "Task::stop: not running, ignoring");
            return false;
        }
        self.cancel.cancel();
        self.state = TaskState::Stopped;
        info!(id = %self.id, "Task stopped");
        true
    }

    /// Wait for the scheduling loop to exit
    ///
    /// Cancel-safe: if this future is dropped early the loop keeps its
    /// handle and can still be aborted.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            let result = handle.await;
            self.handle = None;
            if let Err(e) = result
                && !e.is_cancelled()
            {
                warn!(id = %self.id, error = %e, "Task loop panicked");
            }
        }
    }

    /// Abort the loop immediately, including any in-flight workload
    pub fn abort(&mut self) {
        debug!(id = %self.id, "Task::abort: called");
        self.stop();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

struct LoopContext {
    id: String,
    timeout: Duration,
    stats: Arc<RwLock<TaskStatistics>>,
    cancel: CancellationToken,
}

/// Sleep for `duration`; returns false if the task was stopped meanwhile
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

async fn run_loop(ctx: LoopContext, policy: SchedulingPolicy, mut workload: Box<dyn Workload>) {
    debug!(id = %ctx.id, "run_loop: called");

    if let Some(delay) = policy.first_delay() {
        debug!(id = %ctx.id, ?delay, "run_loop: first delay");
        if !sleep_or_cancel(delay, &ctx.cancel).await {
            return;
        }
    }

    match policy {
        SchedulingPolicy::SelfRegulating(policy) => {
            while !ctx.cancel.is_cancelled() {
                let outcome = execute(&ctx.id, ctx.timeout, workload.as_mut(), &ctx.stats).await;
                let deadline = outcome.and_then(|o| o.next_deadline);
                let sleep = policy.next_sleep(deadline, Instant::now());
                debug!(id = %ctx.id, ?sleep, "run_loop: self-regulated sleep");
                if !sleep_or_cancel(sleep, &ctx.cancel).await {
                    break;
                }
            }
        }
        SchedulingPolicy::FuzzyPeriodic(policy) => {
            while !ctx.cancel.is_cancelled() {
                let sleep = policy.next_sleep(&mut rand::rng());
                debug!(id = %ctx.id, ?sleep, "run_loop: fuzzy sleep");

                // The period starts counting before the workload runs
                let period = tokio::time::sleep(sleep);
                tokio::pin!(period);

                execute(&ctx.id, ctx.timeout, workload.as_mut(), &ctx.stats).await;

                tokio::select! {
                    _ = &mut period => {}
                    _ = ctx.cancel.cancelled() => break,
                }
            }
        }
    }

    debug!(id = %ctx.id, "run_loop: exiting");
}
