//! In-memory collaborators for pipeline tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{Channel, ExtendedMetadata, Story, StoryEnrichment, StoryPost};
use crate::remote::{PublishingPlatform, RemoteError, RemotePost, StorySource};

/// Story last active `minute` minutes after a fixed origin
pub fn story(id: &str, size: u64, minute: i64) -> Story {
    let origin = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Story {
        id: id.to_string(),
        channel_id: "en".to_string(),
        size,
        start_date: origin,
        last_activity: origin + chrono::Duration::minutes(minute),
    }
}

/// Serves a fixed catalog of stories, ordered by activity
#[derive(Default)]
pub struct FakeSource {
    pub stories: Mutex<Vec<Story>>,
    /// Every `(since, limit)` the pipeline asked for
    pub queries: Mutex<Vec<(Option<DateTime<Utc>>, usize)>>,
    pub metadata_calls: Mutex<usize>,
}

impl FakeSource {
    pub fn with_stories(stories: Vec<Story>) -> Self {
        Self {
            stories: Mutex::new(stories),
            ..Default::default()
        }
    }

    /// Replace a story's size, as if items were added to it
    pub fn grow(&self, id: &str, size: u64) {
        let mut stories = self.stories.lock().unwrap();
        for story in stories.iter_mut().filter(|s| s.id == id) {
            story.size = size;
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl StorySource for FakeSource {
    async fn fetch_updated_since(
        &self,
        _channel: &Channel,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Story>, RemoteError> {
        self.queries.lock().unwrap().push((since, limit));
        let mut stories: Vec<Story> = self
            .stories
            .lock()
            .unwrap()
            .iter()
            .filter(|s| since.is_none_or(|since| s.last_activity >= since))
            .cloned()
            .collect();
        stories.sort_by_key(|s| s.last_activity);
        stories.truncate(limit);
        Ok(stories)
    }

    async fn extended_metadata(&self, story: &Story) -> Result<ExtendedMetadata, RemoteError> {
        *self.metadata_calls.lock().unwrap() += 1;
        let size = self
            .stories
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == story.id)
            .map(|s| s.size)
            .unwrap_or(story.size);
        Ok(ExtendedMetadata {
            size,
            start_date: story.start_date,
            image_count: 0,
            publication_count: 1,
            verified_count: 0,
        })
    }

    async fn enrichment(&self, story: &Story) -> Result<StoryEnrichment, RemoteError> {
        Ok(StoryEnrichment {
            title: format!("Story {}", story.id),
            texts: vec![format!("text of {}", story.id)],
            ..Default::default()
        })
    }
}

/// Records every call; can be told to fail on one key
#[derive(Default)]
pub struct FakePlatform {
    pub posts: Mutex<HashMap<String, (String, StoryPost)>>,
    pub creates: Mutex<usize>,
    pub updates: Mutex<usize>,
    pub finds: Mutex<usize>,
    pub fulltexts: Mutex<Vec<(String, String)>>,
    pub fail_key: Mutex<Option<String>>,
}

impl FakePlatform {
    /// Create and update calls so far
    pub fn writes(&self) -> usize {
        *self.creates.lock().unwrap() + *self.updates.lock().unwrap()
    }

    fn check_failure(&self, key: &str) -> Result<(), RemoteError> {
        if self.fail_key.lock().unwrap().as_deref() == Some(key) {
            return Err(RemoteError::ApiError {
                status: 503,
                message: format!("refusing {}", key),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PublishingPlatform for FakePlatform {
    async fn find_post(&self, key: &str) -> Result<Option<RemotePost>, RemoteError> {
        *self.finds.lock().unwrap() += 1;
        Ok(self.posts.lock().unwrap().get(key).map(|(id, post)| RemotePost {
            id: id.clone(),
            fields: post.fields.clone(),
        }))
    }

    async fn create_post(&self, post: &StoryPost) -> Result<String, RemoteError> {
        self.check_failure(&post.key)?;
        let mut creates = self.creates.lock().unwrap();
        *creates += 1;
        let id = format!("post-{}", post.key);
        self.posts
            .lock()
            .unwrap()
            .insert(post.key.clone(), (id.clone(), post.clone()));
        Ok(id)
    }

    async fn update_post(&self, remote_id: &str, post: &StoryPost) -> Result<(), RemoteError> {
        self.check_failure(&post.key)?;
        let mut posts = self.posts.lock().unwrap();
        if !posts.values().any(|(id, _)| id == remote_id) {
            return Err(RemoteError::ApiError {
                status: 404,
                message: format!("no post {}", remote_id),
            });
        }
        *self.updates.lock().unwrap() += 1;
        posts.insert(post.key.clone(), (remote_id.to_string(), post.clone()));
        Ok(())
    }

    async fn upload_fulltext(&self, remote_id: &str, text: &str) -> Result<(), RemoteError> {
        self.fulltexts
            .lock()
            .unwrap()
            .push((remote_id.to_string(), text.to_string()));
        Ok(())
    }
}
