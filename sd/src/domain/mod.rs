//! Domain types for story synchronization

mod channel;
mod post;
mod story;

pub use channel::Channel;
pub use post::{StoryPost, clean_text};
pub use story::{ExtendedMetadata, LinkedImage, Story, StoryEnrichment};
