//! SPARQL client for the graph store

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{RemoteError, StorySource};
use crate::config::GraphConfig;
use crate::domain::{Channel, ExtendedMetadata, LinkedImage, Story, StoryEnrichment};

const PREFIXES: &str = "PREFIX pheme: <http://www.pheme.eu/ontology/pheme#>\nPREFIX sioc: <http://rdfs.org/sioc/ns#>\nPREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n";

/// Number of texts fetched per story for the full-text body
const TEXT_LIMIT: usize = 20;

/// Number of linked images fetched per story
const IMAGE_LIMIT: usize = 10;

type Binding = HashMap<String, SparqlTerm>;

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<Binding>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

/// Graph store client
pub struct GraphClient {
    endpoint: String,
    http: Client,
    min_story_size: u64,
}

impl GraphClient {
    pub fn from_config(config: &GraphConfig) -> Result<Self, RemoteError> {
        debug!(?config, "GraphClient::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(RemoteError::Network)?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            http,
            min_story_size: config.min_story_size,
        })
    }

    async fn query(&self, sparql: &str) -> Result<Vec<Binding>, RemoteError> {
        debug!(%self.endpoint, "GraphClient::query: called");
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", sparql)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            debug!(%status, "GraphClient::query: API error");
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::ApiError { status, message: text });
        }

        let body = response.text().await?;
        parse_bindings(&body)
    }
}

#[async_trait]
impl StorySource for GraphClient {
    async fn fetch_updated_since(
        &self,
        channel: &Channel,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Story>, RemoteError> {
        debug!(channel = %channel.id, ?since, limit, "GraphClient::fetch_updated_since: called");
        let sparql = updated_since_query(&channel.topic_name, since, limit, self.min_story_size);
        let bindings = self.query(&sparql).await?;
        let stories = parse_stories(&channel.id, &bindings)?;
        info!(channel = %channel.id, count = stories.len(), "Fetched changed stories");
        Ok(stories)
    }

    async fn extended_metadata(&self, story: &Story) -> Result<ExtendedMetadata, RemoteError> {
        debug!(story = %story.id, "GraphClient::extended_metadata: called");
        let sparql = format!(
            "{PREFIXES}select (count(distinct ?a) as ?size) (MIN(?date) as ?startDate)
       (count(distinct ?img) as ?imageCount)
       (count(distinct ?creator) as ?publicationCount)
       (count(distinct ?verified) as ?verifiedCount)
where {{
  ?a pheme:eventId {id} .
  ?a pheme:createdAt ?date .
  optional {{ ?a pheme:hasImage ?img }}
  optional {{ ?a sioc:has_creator ?creator }}
  optional {{ ?a sioc:has_creator ?verified . ?verified pheme:verified true }}
}}",
            id = sparql_string(&story.id)
        );
        let bindings = self.query(&sparql).await?;
        let row = bindings
            .first()
            .ok_or_else(|| RemoteError::InvalidResponse(format!("no metadata for story {}", story.id)))?;
        parse_metadata(row)
    }

    async fn enrichment(&self, story: &Story) -> Result<StoryEnrichment, RemoteError> {
        debug!(story = %story.id, "GraphClient::enrichment: called");
        let id = sparql_string(&story.id);

        let texts = self
            .query(&format!(
                "{PREFIXES}select ?a ?text ?date where {{
  ?a pheme:eventId {id} .
  ?a pheme:createdAt ?date .
  ?a sioc:content ?text .
}} order by desc(?date)
limit {TEXT_LIMIT}"
            ))
            .await?;

        let score = self
            .query(&format!(
                "{PREFIXES}select (AVG(?c) as ?score) where {{
  ?a pheme:eventId {id} .
  ?a pheme:controversiality ?c .
}}"
            ))
            .await?;

        let images = self
            .query(&format!(
                "{PREFIXES}select ?imgUrl (count(?a) as ?count) where {{
  ?a pheme:eventId {id} .
  ?a pheme:hasImage ?imgUrl .
}} group by ?imgUrl
order by desc(?count)
limit {IMAGE_LIMIT}"
            ))
            .await?;

        parse_enrichment(&texts, &score, &images)
    }
}

/// Quote `value` as a SPARQL string literal
fn sparql_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Stories of a topic updated at or after `since`, oldest update first
fn updated_since_query(topic: &str, since: Option<DateTime<Utc>>, limit: usize, min_size: u64) -> String {
    let since = since.unwrap_or(DateTime::<Utc>::UNIX_EPOCH).to_rfc3339();
    format!(
        "{PREFIXES}select ?eventId (MIN(?date) as ?startDate) (MAX(?date) as ?lastUpdate) (count(?a) as ?size)
where {{
  ?a pheme:createdAt ?date .
  ?a pheme:eventId ?eventId .
  ?a pheme:topicName {topic} .
}} GROUP BY (?eventId)
having ((?size >= {min_size}) && (?lastUpdate >= \"{since}\"^^xsd:dateTime))
order by ?lastUpdate
limit {limit}",
        topic = sparql_string(topic)
    )
}

fn parse_bindings(body: &str) -> Result<Vec<Binding>, RemoteError> {
    let response: SparqlResponse = serde_json::from_str(body)?;
    Ok(response.results.bindings)
}

fn field<'a>(row: &'a Binding, name: &str) -> Result<&'a str, RemoteError> {
    row.get(name)
        .map(|t| t.value.as_str())
        .ok_or_else(|| RemoteError::InvalidResponse(format!("missing binding '{}'", name)))
}

fn count_field(row: &Binding, name: &str) -> Result<u64, RemoteError> {
    let value = field(row, name)?;
    value
        .parse()
        .map_err(|_| RemoteError::InvalidResponse(format!("binding '{}' is not a count: {}", name, value)))
}

fn date_field(row: &Binding, name: &str) -> Result<DateTime<Utc>, RemoteError> {
    let value = field(row, name)?;
    parse_datetime(value)
        .ok_or_else(|| RemoteError::InvalidResponse(format!("binding '{}' is not a date: {}", name, value)))
}

/// Graph dates are ISO 8601, with or without an offset; naive ones are UTC
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_stories(channel_id: &str, bindings: &[Binding]) -> Result<Vec<Story>, RemoteError> {
    bindings
        .iter()
        .map(|row| {
            Ok(Story {
                id: field(row, "eventId")?.to_string(),
                channel_id: channel_id.to_string(),
                size: count_field(row, "size")?,
                start_date: date_field(row, "startDate")?,
                last_activity: date_field(row, "lastUpdate")?,
            })
        })
        .collect()
}

fn parse_metadata(row: &Binding) -> Result<ExtendedMetadata, RemoteError> {
    Ok(ExtendedMetadata {
        size: count_field(row, "size")?,
        start_date: date_field(row, "startDate")?,
        image_count: count_field(row, "imageCount")?,
        publication_count: count_field(row, "publicationCount")?,
        verified_count: count_field(row, "verifiedCount")?,
    })
}

fn parse_enrichment(texts: &[Binding], score: &[Binding], images: &[Binding]) -> Result<StoryEnrichment, RemoteError> {
    // Latest item gives the title and is featured
    let featured_item = match texts.first() {
        Some(row) => Some(json!({
            "id": field(row, "a")?,
            "text": field(row, "text")?,
            "created_at": field(row, "date")?,
        })),
        None => None,
    };
    let title = texts
        .first()
        .and_then(|row| row.get("text"))
        .map(|t| t.value.trim().to_string())
        .unwrap_or_default();

    let controversiality = score
        .first()
        .and_then(|row| row.get("score"))
        .and_then(|t| t.value.parse::<f64>().ok())
        .unwrap_or(0.0);

    let images = images
        .iter()
        .map(|row| {
            Ok(LinkedImage {
                url: field(row, "imgUrl")?.to_string(),
                count: count_field(row, "count")?,
            })
        })
        .collect::<Result<Vec<_>, RemoteError>>()?;

    let texts = texts
        .iter()
        .filter_map(|row| row.get("text"))
        .map(|t| t.value.clone())
        .collect();

    Ok(StoryEnrichment {
        title,
        featured_item,
        controversiality,
        images,
        texts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const STORIES: &str = r#"{
  "head": { "vars": ["eventId", "startDate", "lastUpdate", "size"] },
  "results": { "bindings": [
    {
      "eventId": { "type": "literal", "value": "1001" },
      "startDate": { "type": "literal", "value": "2024-03-01T10:00:00Z" },
      "lastUpdate": { "type": "literal", "value": "2024-03-01T12:30:00.000+00:00" },
      "size": { "type": "literal", "datatype": "http://www.w3.org/2001/XMLSchema#integer", "value": "5" }
    },
    {
      "eventId": { "type": "literal", "value": "1002" },
      "startDate": { "type": "literal", "value": "2024-03-01T11:00:00" },
      "lastUpdate": { "type": "literal", "value": "2024-03-01T13:00:00" },
      "size": { "type": "literal", "value": "2" }
    }
  ] }
}"#;

    #[test]
    fn test_parse_stories() {
        let bindings = parse_bindings(STORIES).unwrap();
        let stories = parse_stories("en", &bindings).unwrap();

        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].id, "1001");
        assert_eq!(stories[0].channel_id, "en");
        assert_eq!(stories[0].size, 5);
        assert_eq!(
            stories[0].last_activity,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        // Naive dates are read as UTC
        assert_eq!(stories[1].start_date, Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_stories_missing_binding() {
        let body = r#"{"results": {"bindings": [{"eventId": {"value": "1"}}]}}"#;
        let bindings = parse_bindings(body).unwrap();
        let err = parse_stories("en", &bindings).unwrap_err();
        assert!(matches!(err, RemoteError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_bindings_rejects_garbage() {
        assert!(matches!(parse_bindings("<html>"), Err(RemoteError::Json(_))));
    }

    #[test]
    fn test_updated_since_query() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let q = updated_since_query("pheme_en_graphdb", Some(since), 24, 2);

        assert!(q.contains("pheme:topicName \"pheme_en_graphdb\""));
        assert!(q.contains("?size >= 2"));
        assert!(q.contains("\"2024-03-01T00:00:00+00:00\"^^xsd:dateTime"));
        assert!(q.contains("order by ?lastUpdate"));
        assert!(q.ends_with("limit 24"));

        // No cursor means the beginning of time
        let q = updated_since_query("t", None, 10, 2);
        assert!(q.contains("\"1970-01-01T00:00:00+00:00\""));
    }

    #[test]
    fn test_sparql_string_escapes() {
        assert_eq!(sparql_string(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_parse_enrichment() {
        let texts = parse_bindings(
            r#"{"results": {"bindings": [
                {"a": {"value": "t2"}, "text": {"value": " Latest news "}, "date": {"value": "2024-03-01T12:00:00Z"}},
                {"a": {"value": "t1"}, "text": {"value": "Older"}, "date": {"value": "2024-03-01T11:00:00Z"}}
            ]}}"#,
        )
        .unwrap();
        let score = parse_bindings(r#"{"results": {"bindings": [{"score": {"value": "0.25"}}]}}"#).unwrap();
        let images = parse_bindings(
            r#"{"results": {"bindings": [{"imgUrl": {"value": "http://img/a.png"}, "count": {"value": "4"}}]}}"#,
        )
        .unwrap();

        let enrichment = parse_enrichment(&texts, &score, &images).unwrap();
        assert_eq!(enrichment.title, "Latest news");
        assert_eq!(enrichment.texts.len(), 2);
        assert_eq!(enrichment.controversiality, 0.25);
        assert_eq!(enrichment.most_shared_image(), Some("http://img/a.png"));
        assert_eq!(enrichment.featured_item.unwrap()["id"], "t2");

        // An empty story enriches to defaults
        let empty = parse_enrichment(&[], &[], &[]).unwrap();
        assert_eq!(empty, StoryEnrichment::default());
    }
}
