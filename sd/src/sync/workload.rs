//! The per-channel sync task

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::options::SyncOptions;
use super::pull::StoryPuller;
use super::push::StoryPusher;
use crate::domain::Channel;
use crate::remote::{PublishingPlatform, StorySource};
use crate::state::StateManager;
use crate::task::{CycleOutcome, Task, TaskError, Workload};

/// Registry id of a channel's sync task
pub fn sync_task_id(channel_id: &str) -> String {
    format!("stories_sync_task_{}", channel_id)
}

/// One pull, push, mark-consumed cycle
pub struct PullPushWorkload {
    task_id: String,
    puller: StoryPuller,
    pusher: StoryPusher,
}

impl PullPushWorkload {
    pub fn new(task_id: impl Into<String>, puller: StoryPuller, pusher: StoryPusher) -> Self {
        Self {
            task_id: task_id.into(),
            puller,
            pusher,
        }
    }
}

#[async_trait]
impl Workload for PullPushWorkload {
    async fn run(&mut self) -> eyre::Result<CycleOutcome> {
        info!(task = %self.task_id, "Doing pull/push");
        let chunk = self.puller.pull().await?;
        let summary = self.pusher.push(&chunk).await?;
        // Cursor moves only once the whole chunk is pushed
        self.puller.mark_consumed(&chunk)?;
        info!(task = %self.task_id, pulled = chunk.len(), pushed = summary.pushed, "Pull/push finished");
        Ok(CycleOutcome::default())
    }
}

/// Build the fuzzy periodic sync task of one channel
pub fn create_story_sync_task(
    channel: Channel,
    options: &SyncOptions,
    source: Arc<dyn StorySource>,
    platform: Arc<dyn PublishingPlatform>,
    state: StateManager,
) -> Result<Task, TaskError> {
    debug!(channel = %channel.id, ?options, "create_story_sync_task: called");
    let policy = options.policy()?;
    let task_id = sync_task_id(&channel.id);

    let pusher = StoryPusher::new(
        source.clone(),
        platform,
        state.clone(),
        options.min_cluster_size,
        channel.category_id,
    );
    let puller = StoryPuller::new(channel, options.chunk_size, source, state);
    let workload = PullPushWorkload::new(task_id.clone(), puller, pusher);

    info!(task = %task_id, "Created story sync task");
    Ok(Task::new(task_id, policy, workload).with_timeout(options.timeout()))
}
