//! Push side: filtered, idempotent republishing

use std::sync::Arc;

use eyre::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{Story, StoryPost};
use crate::remote::{PublishingPlatform, RemoteError, StorySource};
use crate::state::{StateError, StateManager, keys};

/// What one push did with its chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub pushed: usize,
    pub skipped_small: usize,
    pub skipped_unchanged: usize,
}

/// Publishes stories that are big enough and have grown since last seen
pub struct StoryPusher {
    source: Arc<dyn StorySource>,
    platform: Arc<dyn PublishingPlatform>,
    state: StateManager,
    min_cluster_size: u64,
    category_id: Option<u64>,
}

impl StoryPusher {
    pub fn new(
        source: Arc<dyn StorySource>,
        platform: Arc<dyn PublishingPlatform>,
        state: StateManager,
        min_cluster_size: u64,
        category_id: Option<u64>,
    ) -> Self {
        Self {
            source,
            platform,
            state,
            min_cluster_size,
            category_id,
        }
    }

    /// Push a chunk, oldest activity first
    ///
    /// Stops at the first failing story. Stories already pushed stay pushed
    /// and their cached sizes keep the redelivered chunk from duplicating them.
    pub async fn push(&mut self, chunk: &[Story]) -> eyre::Result<PushSummary> {
        let ids: Vec<&str> = chunk.iter().map(|s| s.id.as_str()).collect();
        debug!(?ids, "StoryPusher::push: called");
        let mut summary = PushSummary::default();

        for story in chunk {
            let meta = self
                .source
                .extended_metadata(story)
                .await
                .context(format!("Failed to fetch metadata of story {}", story.id))?;

            if meta.size < self.min_cluster_size {
                info!(story = %story.id, size = meta.size, "Skipping story, too small");
                summary.skipped_small += 1;
                continue;
            }

            if !self.size_has_grown(story, meta.size).await? {
                info!(story = %story.id, size = meta.size, "Skipping story, has not grown");
                summary.skipped_unchanged += 1;
                continue;
            }

            let enrichment = self
                .source
                .enrichment(story)
                .await
                .context(format!("Failed to enrich story {}", story.id))?;

            let post = StoryPost::build(story, &meta, &enrichment, self.category_id);
            let remote_id = self
                .publish(&post)
                .await
                .context(format!("Failed to publish story {}", story.id))?;
            self.platform
                .upload_fulltext(&remote_id, &post.fulltext)
                .await
                .context(format!("Failed to upload full text of story {}", story.id))?;

            // Only after a successful publish, so a failure retries next cycle
            self.state.set_as(&keys::story_size(&story.id), &meta.size)?;
            summary.pushed += 1;
        }

        info!(
            pushed = summary.pushed,
            skipped_small = summary.skipped_small,
            skipped_unchanged = summary.skipped_unchanged,
            "Push finished"
        );
        Ok(summary)
    }

    /// True when `size` exceeds the size recorded at the last push
    async fn size_has_grown(&self, story: &Story, size: u64) -> Result<bool, StateError> {
        let cached: Option<u64> = self.state.get_as(&keys::story_size(&story.id)).await?;
        debug!(story = %story.id, size, ?cached, "StoryPusher::size_has_grown: called");
        Ok(cached.is_none_or(|cached| size > cached))
    }

    /// Update the post for this key if one exists, else create it
    ///
    /// The key is looked up on every call so a post removed on the platform
    /// is recreated. The returned id is only valid for this story's upload.
    async fn publish(&self, post: &StoryPost) -> Result<String, RemoteError> {
        debug!(key = %post.key, "StoryPusher::publish: called");
        let existing = self.platform.find_post(&post.key).await?.map(|p| p.id);

        let remote_id = match existing {
            Some(id) => {
                debug!(%id, "StoryPusher::publish: updating");
                self.platform.update_post(&id, post).await?;
                id
            }
            None => {
                debug!("StoryPusher::publish: creating");
                self.platform.create_post(post).await?
            }
        };

        Ok(remote_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FakePlatform, FakeSource, story};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: Arc<FakeSource>,
        platform: Arc<FakePlatform>,
        state: StateManager,
        pusher: StoryPusher,
    }

    fn setup(stories: Vec<Story>, min_cluster_size: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::spawn(dir.path().join("state.db")).unwrap();
        let source = Arc::new(FakeSource::with_stories(stories));
        let platform = Arc::new(FakePlatform::default());
        let pusher = StoryPusher::new(source.clone(), platform.clone(), state.clone(), min_cluster_size, Some(4));
        Fixture {
            _dir: dir,
            source,
            platform,
            state,
            pusher,
        }
    }

    #[tokio::test]
    async fn test_unchanged_story_is_pushed_once() {
        let s = story("a", 5, 1);
        let mut f = setup(vec![s.clone()], 2);

        let first = f.pusher.push(std::slice::from_ref(&s)).await.unwrap();
        let second = f.pusher.push(std::slice::from_ref(&s)).await.unwrap();

        assert_eq!(first.pushed, 1);
        assert_eq!(second.skipped_unchanged, 1);
        assert_eq!(f.platform.writes(), 1);

        // Growth triggers exactly one more remote call, an update of the same post
        f.source.grow("a", 6);
        let third = f.pusher.push(std::slice::from_ref(&s)).await.unwrap();
        assert_eq!(third.pushed, 1);
        assert_eq!(*f.platform.creates.lock().unwrap(), 1);
        assert_eq!(*f.platform.updates.lock().unwrap(), 1);

        // Metadata is read every time, the platform is only asked when publishing
        assert_eq!(*f.source.metadata_calls.lock().unwrap(), 3);
        assert_eq!(*f.platform.finds.lock().unwrap(), 2);

        f.state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_small_story_never_published() {
        let s = story("tiny", 1, 1);
        let mut f = setup(vec![s.clone()], 2);

        for _ in 0..4 {
            let summary = f.pusher.push(std::slice::from_ref(&s)).await.unwrap();
            assert_eq!(summary.skipped_small, 1);
        }
        assert_eq!(f.platform.writes(), 0);
        assert_eq!(*f.source.metadata_calls.lock().unwrap(), 4);
        assert_eq!(*f.platform.finds.lock().unwrap(), 0);
        assert!(f.platform.fulltexts.lock().unwrap().is_empty());

        f.state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_remote_post_is_updated() {
        let s = story("a", 5, 1);
        let mut f = setup(vec![s.clone()], 2);
        f.pusher.push(std::slice::from_ref(&s)).await.unwrap();

        // A fresh pusher (new process) finds the post instead of duplicating it
        let mut pusher = StoryPusher::new(
            f.source.clone(),
            f.platform.clone(),
            f.state.clone(),
            2,
            None,
        );
        f.source.grow("a", 9);
        pusher.push(std::slice::from_ref(&s)).await.unwrap();

        assert_eq!(*f.platform.creates.lock().unwrap(), 1);
        assert_eq!(*f.platform.updates.lock().unwrap(), 1);
        assert_eq!(f.platform.posts.lock().unwrap().len(), 1);

        f.state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_removed_on_platform_is_recreated() {
        let s = story("a", 5, 1);
        let mut f = setup(vec![s.clone()], 2);
        f.pusher.push(std::slice::from_ref(&s)).await.unwrap();

        f.platform.posts.lock().unwrap().clear();
        f.source.grow("a", 9);

        for _ in 0..5 {
            f.pusher.push(std::slice::from_ref(&s)).await.unwrap();
        }

        // Recreated once, then left alone since the size stays at 9
        assert_eq!(*f.platform.creates.lock().unwrap(), 2);
        assert_eq!(*f.platform.updates.lock().unwrap(), 0);
        assert_eq!(f.platform.posts.lock().unwrap().len(), 1);
        let cached: Option<u64> = f.state.get_as(&keys::story_size("a")).await.unwrap();
        assert_eq!(cached, Some(9));

        f.state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_stories() {
        let chunk = vec![story("a", 3, 1), story("b", 3, 2), story("c", 3, 3)];
        let mut f = setup(chunk.clone(), 2);
        *f.platform.fail_key.lock().unwrap() = Some("b".to_string());

        let err = f.pusher.push(&chunk).await.unwrap_err();
        assert!(format!("{:#}", err).contains("story b"));
        assert_eq!(f.platform.writes(), 1);

        let cached: Option<u64> = f.state.get_as(&keys::story_size("a")).await.unwrap();
        assert_eq!(cached, Some(3));
        let cached: Option<u64> = f.state.get_as(&keys::story_size("b")).await.unwrap();
        assert_eq!(cached, None);

        // Redelivery skips "a" and retries "b"
        *f.platform.fail_key.lock().unwrap() = None;
        let summary = f.pusher.push(&chunk).await.unwrap();
        assert_eq!(summary.skipped_unchanged, 1);
        assert_eq!(summary.pushed, 2);

        f.state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_fulltext_uploaded_to_remote_id() {
        let s = story("a", 5, 1);
        let mut f = setup(vec![s.clone()], 2);
        f.pusher.push(std::slice::from_ref(&s)).await.unwrap();

        let uploads = f.platform.fulltexts.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "post-a");
        assert_eq!(uploads[0].1, "Story a text of a");
    }
}
