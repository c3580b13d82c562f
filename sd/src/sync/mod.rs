//! Incremental pull/push pipeline
//!
//! One fuzzy-periodic task per channel pulls the stories changed since the
//! channel's cursor, republishes them, and only then advances the cursor.
//! A crash mid-push redelivers the batch on restart; the size-growth check
//! in [`StoryPusher`] makes the second delivery a no-op.

mod options;
mod pull;
mod push;
#[cfg(test)]
pub(crate) mod testing;
mod workload;

pub use options::SyncOptions;
pub use pull::{MAX_CHUNK_SIZE, StoryPuller, SyncBatchState};
pub use push::{PushSummary, StoryPusher};
pub use workload::{PullPushWorkload, create_story_sync_task, sync_task_id};
