//! Pull side: changed stories since the channel cursor

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{Channel, Story};
use crate::remote::StorySource;
use crate::state::{StateError, StateManager, keys};

/// Largest chunk a stalled stream is allowed to grow to
pub const MAX_CHUNK_SIZE: usize = 256;

/// Adaptive chunk sizing
///
/// When many stories share the cursor timestamp the same head comes back
/// every cycle. Doubling the chunk lets the tail move past them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatchState {
    base: usize,
    current: usize,
    last_first_id: Option<String>,
}

impl SyncBatchState {
    pub fn new(base: usize) -> Self {
        Self {
            base,
            current: base,
            last_first_id: None,
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Limit for the next query, always within `[base, max(base, 256)]`
    pub fn chunk_size(&self) -> usize {
        self.current
    }

    /// Record the leading story id of a consumed chunk; returns true on a stall
    pub fn observe(&mut self, first_id: &str) -> bool {
        debug!(%first_id, current = self.current, "SyncBatchState::observe: called");
        if self.last_first_id.as_deref() == Some(first_id) {
            let cap = MAX_CHUNK_SIZE.max(self.base);
            self.current = self.current.saturating_mul(2).min(cap);
            debug!(current = self.current, "SyncBatchState::observe: stalled, growing chunk");
            true
        } else {
            debug!("SyncBatchState::observe: progressed, resetting chunk");
            self.current = self.base;
            self.last_first_id = Some(first_id.to_string());
            false
        }
    }
}

/// Reads one channel's changed stories and owns its cursor
pub struct StoryPuller {
    channel: Channel,
    stream: String,
    source: Arc<dyn StorySource>,
    state: StateManager,
    batch: SyncBatchState,
    /// `None` until first read from the store
    cursor: Option<Option<DateTime<Utc>>>,
}

impl StoryPuller {
    pub fn new(channel: Channel, chunk_size: usize, source: Arc<dyn StorySource>, state: StateManager) -> Self {
        let stream = keys::channel_stream(&channel.id);
        Self {
            channel,
            stream,
            source,
            state,
            batch: SyncBatchState::new(chunk_size),
            cursor: None,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn batch(&self) -> &SyncBatchState {
        &self.batch
    }

    /// Whether the channel has been paused by hand
    pub async fn is_frozen(&self) -> Result<bool, StateError> {
        let value = self.state.get(&keys::frozen(&self.stream)).await?;
        Ok(value.as_ref().is_some_and(is_truthy))
    }

    /// Current cursor, read from the store once per process
    pub async fn cursor(&mut self) -> Result<Option<DateTime<Utc>>, StateError> {
        if let Some(cursor) = self.cursor {
            return Ok(cursor);
        }
        debug!(stream = %self.stream, "StoryPuller::cursor: loading");
        let cursor = self.state.get_as(&keys::last_update(&self.stream)).await?;
        self.cursor = Some(cursor);
        Ok(cursor)
    }

    /// Fetch the next chunk, or nothing when the channel is frozen
    pub async fn pull(&mut self) -> eyre::Result<Vec<Story>> {
        debug!(channel = %self.channel.id, "StoryPuller::pull: called");
        if self.is_frozen().await? {
            info!(channel = %self.channel.id, "Channel is frozen, skipping pull");
            return Ok(Vec::new());
        }

        let since = self.cursor().await?;
        let stories = self
            .source
            .fetch_updated_since(&self.channel, since, self.batch.chunk_size())
            .await?;

        let ids: Vec<&str> = stories.iter().map(|s| s.id.as_str()).collect();
        info!(channel = %self.channel.id, ?since, limit = self.batch.chunk_size(), ?ids, "Pulled stories");
        Ok(stories)
    }

    /// Advance the cursor past a fully pushed chunk
    ///
    /// The cursor becomes the last story's activity, so the chunk must be in
    /// ascending activity order.
    pub fn mark_consumed(&mut self, chunk: &[Story]) -> Result<(), StateError> {
        debug!(channel = %self.channel.id, len = chunk.len(), "StoryPuller::mark_consumed: called");
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            debug!("StoryPuller::mark_consumed: empty chunk");
            return Ok(());
        };

        if self.batch.observe(&first.id) {
            info!(
                channel = %self.channel.id,
                chunk_size = self.batch.chunk_size(),
                "No progress, temporarily increasing chunk size"
            );
        }

        self.state.set_as(&keys::last_update(&self.stream), &last.last_activity)?;
        self.cursor = Some(Some(last.last_activity));
        Ok(())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FakeSource, story};
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(stories: Vec<Story>, chunk: usize) -> (TempDir, Arc<FakeSource>, StateManager, StoryPuller) {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::spawn(dir.path().join("state.db")).unwrap();
        let source = Arc::new(FakeSource::with_stories(stories));
        let puller = StoryPuller::new(Channel::new("en", "topic"), chunk, source.clone(), state.clone());
        (dir, source, state, puller)
    }

    #[test]
    fn test_chunk_doubles_on_stall_and_caps() {
        let mut batch = SyncBatchState::new(24);
        assert!(!batch.observe("a"));
        assert_eq!(batch.chunk_size(), 24);

        let mut sizes = Vec::new();
        for _ in 0..5 {
            assert!(batch.observe("a"));
            sizes.push(batch.chunk_size());
        }
        assert_eq!(sizes, vec![48, 96, 192, 256, 256]);

        // Progress resets to base on the very next pull
        assert!(!batch.observe("b"));
        assert_eq!(batch.chunk_size(), 24);
    }

    #[test]
    fn test_base_above_cap_never_shrinks() {
        let mut batch = SyncBatchState::new(300);
        batch.observe("a");
        batch.observe("a");
        assert_eq!(batch.chunk_size(), 300);
    }

    proptest! {
        #[test]
        fn prop_chunk_stays_in_bounds(base in 1usize..300, heads in prop::collection::vec(0u8..3, 1..60)) {
            let mut batch = SyncBatchState::new(base);
            for head in heads {
                let before = batch.chunk_size();
                let stalled = batch.observe(&head.to_string());
                let cap = MAX_CHUNK_SIZE.max(base);
                prop_assert!(batch.chunk_size() >= base);
                prop_assert!(batch.chunk_size() <= cap);
                if stalled {
                    prop_assert_eq!(batch.chunk_size(), (before * 2).min(cap));
                } else {
                    prop_assert_eq!(batch.chunk_size(), base);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_pull_and_consume_advances_cursor() {
        let stories = vec![story("a", 3, 1), story("b", 3, 2), story("c", 3, 3)];
        let (_dir, source, state, mut puller) = setup(stories, 2);

        let chunk = puller.pull().await.unwrap();
        assert_eq!(chunk.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(source.queries.lock().unwrap()[0], (None, 2));

        puller.mark_consumed(&chunk).unwrap();
        let key = keys::last_update(&keys::channel_stream("en"));
        let stored: Option<DateTime<Utc>> = state.get_as(&key).await.unwrap();
        assert_eq!(stored, Some(chunk[1].last_activity));

        // Next query starts at the cursor, inclusive
        let chunk = puller.pull().await.unwrap();
        assert_eq!(chunk.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(source.queries.lock().unwrap()[1].0, Some(story("b", 3, 2).last_activity));

        state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_stream_grows_chunk() {
        // Three stories sharing one timestamp, pulled one at a time
        let stories = vec![story("a", 3, 5), story("b", 3, 5), story("c", 3, 5)];
        let (_dir, source, state, mut puller) = setup(stories, 1);

        for _ in 0..3 {
            let chunk = puller.pull().await.unwrap();
            puller.mark_consumed(&chunk).unwrap();
        }

        let limits: Vec<usize> = source.queries.lock().unwrap().iter().map(|q| q.1).collect();
        assert_eq!(limits, vec![1, 1, 2]);
        assert_eq!(puller.batch().chunk_size(), 4);

        state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_frozen_channel_skips_query() {
        let (_dir, source, state, mut puller) = setup(vec![story("a", 3, 1)], 24);

        state.set(&keys::frozen(&keys::channel_stream("en")), json!(true));
        assert!(puller.pull().await.unwrap().is_empty());
        assert_eq!(source.query_count(), 0);

        state.set(&keys::frozen(&keys::channel_stream("en")), json!(false));
        assert_eq!(puller.pull().await.unwrap().len(), 1);
        assert_eq!(source.query_count(), 1);

        state.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_chunk_keeps_cursor_and_size() {
        let (_dir, _source, state, mut puller) = setup(Vec::new(), 24);

        let chunk = puller.pull().await.unwrap();
        puller.mark_consumed(&chunk).unwrap();

        assert_eq!(puller.cursor().await.unwrap(), None);
        assert_eq!(puller.batch(), &SyncBatchState::new(24));

        state.quit().await.unwrap();
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }
}
