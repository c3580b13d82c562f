//! Key layout for values kept in the state store

/// State-store prefix for a channel's pull stream
pub fn channel_stream(channel_id: &str) -> String {
    format!("pull_stories_channel_{}", channel_id)
}

/// Cursor: activity timestamp up to which the stream has been fully pulled
pub fn last_update(stream: &str) -> String {
    format!("{}.last_update", stream)
}

/// Manual pause flag for a stream
pub fn frozen(stream: &str) -> String {
    format!("{}.frozen", stream)
}

/// Size of a story the last time it was pushed
pub fn story_size(story_id: &str) -> String {
    format!("story_cached_data.{}.size", story_id)
}
