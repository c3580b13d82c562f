//! Story - a cluster of items tracked across pull cycles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A story as returned by the changed-records query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Natural key, stable across runs
    pub id: String,
    pub channel_id: String,
    /// Number of items in the cluster
    pub size: u64,
    pub start_date: DateTime<Utc>,
    /// Most recent activity; the pull ordering key
    pub last_activity: DateTime<Utc>,
}

impl Story {
    /// Items per hour over the story's lifetime
    ///
    /// A story whose lifetime is zero reports its size.
    pub fn average_activity(&self) -> f64 {
        let hours = (self.last_activity - self.start_date).num_milliseconds() as f64 / 3_600_000.0;
        if hours <= 0.0 {
            self.size as f64
        } else {
            self.size as f64 / hours
        }
    }
}

/// Derived metadata fetched per story before pushing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetadata {
    pub size: u64,
    pub start_date: DateTime<Utc>,
    pub image_count: u64,
    pub publication_count: u64,
    pub verified_count: u64,
}

/// An image linked from a story with the number of times it was shared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedImage {
    pub url: String,
    pub count: u64,
}

/// Fields fetched only for stories that are about to be published
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryEnrichment {
    pub title: String,
    pub featured_item: Option<serde_json::Value>,
    pub controversiality: f64,
    pub images: Vec<LinkedImage>,
    pub texts: Vec<String>,
}

impl StoryEnrichment {
    /// URL of the most shared image, if any
    pub fn most_shared_image(&self) -> Option<&str> {
        self.images.iter().max_by_key(|i| i.count).map(|i| i.url.as_str())
    }
}
