//! External collaborators
//!
//! The pipeline only sees the [`StorySource`] and [`PublishingPlatform`]
//! traits; [`GraphClient`] and [`PlatformClient`] are the HTTP
//! implementations used by the daemon.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::{Channel, ExtendedMetadata, Story, StoryEnrichment, StoryPost};

mod error;
mod graph;
mod platform;
mod token;

pub use error::RemoteError;
pub use graph::GraphClient;
pub use platform::PlatformClient;
pub use token::{MIN_REFRESH_DELAY, TOKEN_REFRESH_TASK_ID, TokenRefreshWorkload, refresh_delay};

/// Source of changed stories and their derived data
#[async_trait]
pub trait StorySource: Send + Sync {
    /// Stories of `channel` with activity at or after `since`, oldest activity first
    async fn fetch_updated_since(
        &self,
        channel: &Channel,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Story>, RemoteError>;

    async fn extended_metadata(&self, story: &Story) -> Result<ExtendedMetadata, RemoteError>;

    async fn enrichment(&self, story: &Story) -> Result<StoryEnrichment, RemoteError>;
}

/// A post as it exists on the platform
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Target platform the stories are republished to
#[async_trait]
pub trait PublishingPlatform: Send + Sync {
    /// Find the post published for natural key `key`
    async fn find_post(&self, key: &str) -> Result<Option<RemotePost>, RemoteError>;

    /// Create a post, returning its remote id
    async fn create_post(&self, post: &StoryPost) -> Result<String, RemoteError>;

    async fn update_post(&self, remote_id: &str, post: &StoryPost) -> Result<(), RemoteError>;

    async fn upload_fulltext(&self, remote_id: &str, text: &str) -> Result<(), RemoteError>;
}

/// Something holding an expiring access token
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a fresh token, returning how long it stays valid
    async fn refresh_token(&self) -> Result<Duration, RemoteError>;
}
