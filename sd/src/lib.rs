//! StorySync - recurrent task scheduling and incremental story sync
//!
//! Many independent periodic jobs run forever inside one process. Each
//! configured channel gets a task that pulls the stories changed since its
//! cursor from a graph store and republishes them to a publishing platform.
//!
//! # Modules
//!
//! - [`state`] - durable key/value state behind a single-consumer mailbox
//! - [`task`] - execution wrapper, scheduling policies and task registry
//! - [`sync`] - the pull/push pipeline driven by one task per channel
//! - [`domain`] - channels, stories and the posts built from them
//! - [`remote`] - graph store and publishing platform clients
//! - [`config`] - configuration types and loading
//! - [`daemon`] - process context tying the pieces together
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod remote;
pub mod state;
pub mod sync;
pub mod task;

// Re-export commonly used types
pub use config::{ChannelConfig, Config, GraphConfig, PlatformConfig, StorageConfig};
pub use daemon::SyncDaemon;
pub use domain::{Channel, ExtendedMetadata, LinkedImage, Story, StoryEnrichment, StoryPost};
pub use remote::{
    GraphClient, PlatformClient, PublishingPlatform, RemoteError, RemotePost, StorySource, TokenRefreshWorkload,
    TokenSource,
};
pub use state::{StateCommand, StateError, StateManager, StateResponse};
pub use sync::{
    MAX_CHUNK_SIZE, PullPushWorkload, PushSummary, StoryPuller, StoryPusher, SyncBatchState, SyncOptions,
    create_story_sync_task,
};
pub use task::{
    CycleOutcome, FirstDelay, FuzzyPeriodicConfig, SchedulingPolicy, SelfRegulatingConfig, Task, TaskError,
    TaskRegistry, TaskState, TaskStatistics, Workload,
};
