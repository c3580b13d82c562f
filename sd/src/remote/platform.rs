//! Publishing platform REST client

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{PublishingPlatform, RemoteError, RemotePost, TokenSource};
use crate::config::PlatformConfig;
use crate::domain::StoryPost;

/// Scopes requested with every token
const TOKEN_SCOPE: &str = "posts media forms api tags savedsearches sets users";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    username: &'a str,
    password: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Platform client holding the current bearer token
pub struct PlatformClient {
    base_url: String,
    http: Client,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    form_id: u64,
    token: RwLock<Option<String>>,
}

impl PlatformClient {
    /// Create a client; no token is held until [`TokenSource::refresh_token`] runs
    pub fn from_config(config: &PlatformConfig, password: String) -> Result<Self, RemoteError> {
        debug!(%config.base_url, "PlatformClient::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(RemoteError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            username: config.username.clone(),
            password,
            form_id: config.form_id,
            token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> Result<String, RemoteError> {
        let guard = self
            .token
            .read()
            .map_err(|_| RemoteError::InvalidResponse("token lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| RemoteError::InvalidResponse("no access token, refresh first".to_string()))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        debug!(%method, %path, "PlatformClient::request: called");
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json")
            .bearer_auth(self.bearer()?);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            debug!(%status, "PlatformClient::request: API error");
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::ApiError { status, message: text });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            debug!("PlatformClient::request: empty body");
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl TokenSource for PlatformClient {
    async fn refresh_token(&self) -> Result<Duration, RemoteError> {
        debug!("PlatformClient::refresh_token: called");
        let request = TokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            grant_type: "password",
            username: &self.username,
            password: &self.password,
            scope: TOKEN_SCOPE,
        };

        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::ApiError { status, message: text });
        }

        let token: TokenResponse = response.json().await?;
        let mut guard = self
            .token
            .write()
            .map_err(|_| RemoteError::InvalidResponse("token lock poisoned".to_string()))?;
        *guard = Some(token.access_token);

        info!(expires_in = token.expires_in, "Platform access token refreshed");
        Ok(Duration::from_secs(token.expires_in))
    }
}

#[async_trait]
impl PublishingPlatform for PlatformClient {
    async fn find_post(&self, key: &str) -> Result<Option<RemotePost>, RemoteError> {
        debug!(%key, "PlatformClient::find_post: called");
        let query = [
            ("form[]", self.form_id.to_string()),
            ("values[theme-id]", key.to_string()),
            ("limit", "1".to_string()),
            ("offset", "0".to_string()),
            ("status", "all".to_string()),
        ];
        let response = self.request(Method::GET, "/api/v3/posts", &query, None).await?;
        parse_lookup(&response)
    }

    async fn create_post(&self, post: &StoryPost) -> Result<String, RemoteError> {
        debug!(key = %post.key, "PlatformClient::create_post: called");
        let body = post_body(self.form_id, post);
        let response = self.request(Method::POST, "/api/v3/posts", &[], Some(&body)).await?;
        let id = remote_id(&response)
            .ok_or_else(|| RemoteError::InvalidResponse(format!("created post for {} has no id", post.key)))?;
        info!(key = %post.key, %id, "Created post");
        Ok(id)
    }

    async fn update_post(&self, remote_id: &str, post: &StoryPost) -> Result<(), RemoteError> {
        debug!(%remote_id, key = %post.key, "PlatformClient::update_post: called");
        let mut body = post_body(self.form_id, post);
        body["id"] = json!(remote_id);
        let path = format!("/api/v3/posts/{}", remote_id);
        self.request(Method::PUT, &path, &[], Some(&body)).await?;
        info!(key = %post.key, %remote_id, "Updated post");
        Ok(())
    }

    async fn upload_fulltext(&self, remote_id: &str, text: &str) -> Result<(), RemoteError> {
        debug!(%remote_id, len = text.len(), "PlatformClient::upload_fulltext: called");
        let path = format!("/api/v3/posts/{}/fulltext", remote_id);
        let body = json!({ "text": text });
        self.request(Method::POST, &path, &[], Some(&body)).await?;
        Ok(())
    }
}

/// JSON body of a create or update request
fn post_body(form_id: u64, post: &StoryPost) -> Value {
    // Every platform value is a list
    let values: Map<String, Value> = post
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), json!([v])))
        .collect();
    let tags: Vec<u64> = post.category_id.into_iter().collect();

    json!({
        "locale": "en_US",
        "type": "report",
        "status": "draft",
        "title": post.title,
        "content": format!("Theme ID {}", post.key),
        "slug": format!("theme-id-{}", post.key),
        "form": { "id": form_id },
        "tags": tags,
        "values": values,
        "completed_stages": [],
    })
}

/// Ids come back as numbers or strings
fn remote_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_lookup(response: &Value) -> Result<Option<RemotePost>, RemoteError> {
    let Some(first) = response.get("results").and_then(Value::as_array).and_then(|r| r.first()) else {
        return Ok(None);
    };

    let id = remote_id(first).ok_or_else(|| RemoteError::InvalidResponse("post without id".to_string()))?;
    let fields = first
        .get("values")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(Some(RemotePost { id, fields }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> StoryPost {
        let mut fields = Map::new();
        fields.insert("theme-id".to_string(), json!("42"));
        fields.insert("theme-size".to_string(), json!(7));
        StoryPost {
            key: "42".to_string(),
            title: "Flooding downtown".to_string(),
            category_id: Some(3),
            fields,
            fulltext: "Flooding downtown".to_string(),
        }
    }

    #[test]
    fn test_post_body() {
        let body = post_body(9, &post());

        assert_eq!(body["title"], "Flooding downtown");
        assert_eq!(body["form"]["id"], 9);
        assert_eq!(body["tags"], json!([3]));
        assert_eq!(body["slug"], "theme-id-42");
        assert_eq!(body["values"]["theme-id"], json!(["42"]));
        assert_eq!(body["values"]["theme-size"], json!([7]));
    }

    #[test]
    fn test_post_body_without_category() {
        let mut post = post();
        post.category_id = None;
        assert_eq!(post_body(1, &post)["tags"], json!([]));
    }

    #[test]
    fn test_parse_lookup() {
        let found = json!({
            "count": 1,
            "results": [{ "id": 118, "values": { "theme-id": ["42"], "theme-size": [5] } }]
        });
        let post = parse_lookup(&found).unwrap().unwrap();
        assert_eq!(post.id, "118");
        assert_eq!(post.fields["theme-size"], json!([5]));

        assert!(parse_lookup(&json!({ "count": 0, "results": [] })).unwrap().is_none());
        assert!(parse_lookup(&json!({ "errors": [] })).unwrap().is_none());
        assert!(parse_lookup(&json!({ "results": [{ "values": {} }] })).is_err());
    }

    #[test]
    fn test_remote_id() {
        assert_eq!(remote_id(&json!({ "id": "abc" })).as_deref(), Some("abc"));
        assert_eq!(remote_id(&json!({ "id": 5 })).as_deref(), Some("5"));
        assert_eq!(remote_id(&json!({ "id": null })), None);
    }
}
