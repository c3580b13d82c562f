//! TaskRegistry - the table of every task in the process
//!
//! Meant to be driven from a single async context; it is not shared across
//! threads.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::TaskError;
use super::stats::TaskStatistics;
use super::task::{Task, TaskState};

/// Owns registered tasks by id
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        debug!("TaskRegistry::new: called");
        Self::default()
    }

    /// Take ownership of `task`, starting it if `start` is set
    ///
    /// Fails with [`TaskError::Duplicate`] if the id is taken; the existing
    /// registration is left untouched.
    pub fn register(&mut self, mut task: Task, start: bool) -> Result<(), TaskError> {
        let id = task.id().to_string();
        debug!(%id, start, "TaskRegistry::register: called");

        if self.tasks.contains_key(&id) {
            debug!(%id, "TaskRegistry::register: duplicate id, rejecting");
            return Err(TaskError::Duplicate(id));
        }

        if start {
            info!(%id, "Starting task");
            task.start()?;
        }
        self.tasks.insert(id, task);
        Ok(())
    }

    /// Start a registered task that was registered without starting
    pub fn start(&mut self, id: &str) -> Result<(), TaskError> {
        debug!(%id, "TaskRegistry::start: called");
        match self.tasks.get_mut(id) {
            Some(task) => task.start(),
            None => Err(TaskError::NotFound(id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Ids of tasks currently running
    pub fn running_ids(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.state() == TaskState::Running)
            .map(|t| t.id().to_string())
            .collect()
    }

    /// Statistics snapshot of every task, keyed by id
    pub fn statistics(&self) -> BTreeMap<String, TaskStatistics> {
        debug!("TaskRegistry::statistics: called");
        self.tasks
            .iter()
            .map(|(id, task)| (id.clone(), task.statistics()))
            .collect()
    }

    /// Stop every task and wait up to `grace` for their loops to exit
    ///
    /// Loops still busy after the grace period are aborted. Tasks stay in
    /// the table, so their ids remain reserved.
    pub async fn shutdown(&mut self, grace: Duration) {
        debug!(?grace, "TaskRegistry::shutdown: called");
        info!(count = self.tasks.len(), "Stopping all tasks");

        for task in self.tasks.values_mut() {
            task.stop();
        }

        let finished = {
            let joins = self.tasks.values_mut().map(|t| t.join());
            tokio::time::timeout(grace, futures::future::join_all(joins)).await.is_ok()
        };
        if !finished {
            let stragglers: Vec<_> = self
                .tasks
                .values_mut()
                .filter(|t| !t.is_finished())
                .map(|t| {
                    t.abort();
                    t.id().to_string()
                })
                .collect();
            warn!(?stragglers, "Aborted tasks still running after grace period");
        }

        info!("All tasks stopped");
    }
}
