//! StoryPost - a story flattened into the platform's field map

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::story::{ExtendedMetadata, Story, StoryEnrichment};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything the platform receives for one story
#[derive(Debug, Clone, PartialEq)]
pub struct StoryPost {
    /// Natural key the platform looks posts up by
    pub key: String,
    pub title: String,
    /// Platform category the post is filed under
    pub category_id: Option<u64>,
    /// Flat key/value payload
    pub fields: Map<String, Value>,
    /// Cleaned title followed by the story texts
    pub fulltext: String,
}

impl StoryPost {
    /// Combine a story with its fetched metadata and enrichment
    pub fn build(
        story: &Story,
        meta: &ExtendedMetadata,
        enrichment: &StoryEnrichment,
        category_id: Option<u64>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert("theme-id".to_string(), json!(story.id));
        fields.insert("theme-channel-id".to_string(), json!(story.channel_id));
        fields.insert("theme-size".to_string(), json!(meta.size));
        fields.insert("theme-start-date".to_string(), json!(format_datetime(&meta.start_date)));
        fields.insert(
            "theme-last-activity".to_string(),
            json!(format_datetime(&story.last_activity)),
        );
        fields.insert(
            "theme-average-activity".to_string(),
            json!(format!("{:.2}", story.average_activity())),
        );
        fields.insert(
            "theme-featured-tweet".to_string(),
            json!(
                enrichment
                    .featured_item
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            ),
        );
        fields.insert("theme-img-count".to_string(), json!(meta.image_count));
        fields.insert("theme-pub-count".to_string(), json!(meta.publication_count));
        fields.insert("theme-verified-count".to_string(), json!(meta.verified_count));
        fields.insert(
            "theme-controversiality".to_string(),
            json!(format!("{:.2}", enrichment.controversiality)),
        );
        fields.insert(
            "theme-most-shared-img".to_string(),
            json!(enrichment.most_shared_image().unwrap_or("")),
        );

        let title = if enrichment.title.trim().is_empty() {
            format!("ID {}", story.id)
        } else {
            enrichment.title.trim().to_string()
        };

        let fulltext = std::iter::once(clean_text(&title))
            .chain(enrichment.texts.iter().map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            key: story.id.clone(),
            title,
            category_id,
            fields,
            fulltext,
        }
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Strip links and collapse whitespace
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| !(w.starts_with("http://") || w.starts_with("https://")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LinkedImage;
    use chrono::TimeZone;

    fn sample() -> (Story, ExtendedMetadata, StoryEnrichment) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let story = Story {
            id: "77".to_string(),
            channel_id: "trump".to_string(),
            size: 12,
            start_date: start,
            last_activity: start + chrono::Duration::hours(2),
        };
        let meta = ExtendedMetadata {
            size: 12,
            start_date: start,
            image_count: 3,
            publication_count: 2,
            verified_count: 1,
        };
        let enrichment = StoryEnrichment {
            title: "Rally  moved https://t.co/x downtown".to_string(),
            featured_item: Some(json!({"id": "t1"})),
            controversiality: 0.456,
            images: vec![LinkedImage {
                url: "https://img/1.png".to_string(),
                count: 4,
            }],
            texts: vec!["first".to_string(), " second ".to_string()],
        };
        (story, meta, enrichment)
    }

    #[test]
    fn test_build_fields() {
        let (story, meta, enrichment) = sample();
        let post = StoryPost::build(&story, &meta, &enrichment, Some(5));

        assert_eq!(post.key, "77");
        assert_eq!(post.category_id, Some(5));
        assert_eq!(post.fields["theme-id"], json!("77"));
        assert_eq!(post.fields["theme-size"], json!(12));
        assert_eq!(post.fields["theme-start-date"], json!("2024-03-01 12:00:00"));
        assert_eq!(post.fields["theme-last-activity"], json!("2024-03-01 14:00:00"));
        assert_eq!(post.fields["theme-average-activity"], json!("6.00"));
        assert_eq!(post.fields["theme-controversiality"], json!("0.46"));
        assert_eq!(post.fields["theme-most-shared-img"], json!("https://img/1.png"));
        assert_eq!(post.fulltext, "Rally moved downtown first second");
    }

    #[test]
    fn test_untitled_story_gets_id_title() {
        let (story, meta, mut enrichment) = sample();
        enrichment.title = "  ".to_string();
        enrichment.texts.clear();

        let post = StoryPost::build(&story, &meta, &enrichment, None);
        assert_eq!(post.title, "ID 77");
        assert_eq!(post.fulltext, "ID 77");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\tb  http://x.y c "), "a b c");
        assert_eq!(clean_text(""), "");
    }
}
