//! Channel - one logical input stream with its own cursor and schedule

use serde::{Deserialize, Serialize};

/// A data channel (topic / saved search) whose stories are synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Channel {
    /// Stable channel identifier
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub display_name: String,

    /// Topic the graph store files this channel's items under
    #[serde(default)]
    pub topic_name: String,

    /// Platform category (tag) the channel's posts are filed under
    #[serde(default)]
    pub category_id: Option<u64>,
}

impl Channel {
    pub fn new(id: impl Into<String>, topic_name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            topic_name: topic_name.into(),
            category_id: None,
        }
    }
}
