//! StorySync configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Channel;
use crate::sync::SyncOptions;

/// Main StorySync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Durable state storage
    pub storage: StorageConfig,

    /// Graph store the stories are read from
    pub graph: GraphConfig,

    /// Publishing platform the stories are written to
    pub platform: PlatformConfig,

    /// Channels to synchronize, one sync task each
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for channel in &self.channels {
            let id = channel.channel.id.trim();
            if id.is_empty() {
                return Err(eyre::eyre!("Channel with empty id in configuration"));
            }
            if !seen.insert(id) {
                return Err(eyre::eyre!("Duplicate channel id '{}' in configuration", id));
            }
            channel
                .sync
                .validate()
                .map_err(|e| eyre::eyre!("Channel '{}': {}", id, e))?;
        }

        if self.graph.endpoint.is_empty() {
            return Err(eyre::eyre!("graph.endpoint must be set"));
        }
        if self.platform.base_url.is_empty() {
            return Err(eyre::eyre!("platform.base-url must be set"));
        }
        Ok(())
    }

    /// Look up a configured channel by id
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.channel.id == id)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: storysync.yml
        let local_config = PathBuf::from("storysync.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/storysync/storysync.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("storysync").join("storysync.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the state database
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let state_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storysync")
            .join("state.db");
        Self { state_path }
    }
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// SPARQL endpoint URL
    pub endpoint: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Smallest cluster the changed-stories query returns
    #[serde(rename = "min-story-size")]
    pub min_story_size: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7200/repositories/pheme".to_string(),
            timeout_ms: 60_000,
            min_story_size: 2,
        }
    }
}

/// Publishing platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "client-id")]
    pub client_id: String,

    #[serde(rename = "client-secret")]
    pub client_secret: String,

    pub username: String,

    /// Environment variable containing the password
    #[serde(rename = "password-env")]
    pub password_env: String,

    /// Form (post type) the stories are published as
    #[serde(rename = "form-id")]
    pub form_id: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            client_id: "ushahidiui".to_string(),
            client_secret: String::new(),
            username: "admin".to_string(),
            password_env: "STORYSYNC_PLATFORM_PASSWORD".to_string(),
            form_id: 1,
            timeout_ms: 30_000,
        }
    }
}

impl PlatformConfig {
    /// Read the password from the configured environment variable
    pub fn get_password(&self) -> Result<String> {
        std::env::var(&self.password_env).map_err(|_| {
            eyre::eyre!(
                "Platform password not found. Set the {} environment variable.",
                self.password_env
            )
        })
    }
}

/// One channel entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(flatten)]
    pub channel: Channel,

    /// Scheduling and pipeline options
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Load just the log level from the configuration chain
///
/// Used before tracing is initialised, so nothing here logs.
pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
    let candidates: Vec<PathBuf> = match config_path {
        Some(path) => vec![path.clone()],
        None => {
            let mut paths = vec![PathBuf::from("storysync.yml")];
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("storysync").join("storysync.yml"));
            }
            paths
        }
    };

    candidates
        .iter()
        .filter(|p| p.exists())
        .find_map(|p| fs::read_to_string(p).ok())
        .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
        .and_then(|config| config.log_level)
}
