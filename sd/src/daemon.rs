//! SyncDaemon - owns the state store and every running task
//!
//! One daemon per process. `new` opens the store, `start` registers the
//! tasks, `shutdown` stops them and closes the store.

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::remote::{GraphClient, PlatformClient, PublishingPlatform, StorySource, TokenRefreshWorkload, TokenSource};
use crate::state::StateManager;
use crate::sync::create_story_sync_task;
use crate::task::TaskRegistry;

/// How long shutdown waits for task loops before aborting them
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Explicit process context for the sync engine
pub struct SyncDaemon {
    config: Config,
    state: StateManager,
    registry: TaskRegistry,
}

impl SyncDaemon {
    /// Validate the configuration and open the state store
    pub fn new(config: Config) -> Result<Self> {
        debug!(channels = config.channels.len(), "SyncDaemon::new: called");
        config.validate().context("Invalid configuration")?;

        let state = StateManager::spawn(&config.storage.state_path).context(format!(
            "Failed to open state store at {}",
            config.storage.state_path.display()
        ))?;

        Ok(Self {
            config,
            state,
            registry: TaskRegistry::new(),
        })
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Connect to the real services and start all tasks
    pub async fn start(&mut self) -> Result<()> {
        debug!("SyncDaemon::start: called");
        let graph = Arc::new(GraphClient::from_config(&self.config.graph).context("Failed to create graph client")?);
        let password = self
            .config
            .platform
            .get_password()
            .context("Missing platform credentials")?;
        let platform = Arc::new(
            PlatformClient::from_config(&self.config.platform, password).context("Failed to create platform client")?,
        );

        let expires_in = platform
            .refresh_token()
            .await
            .context("Failed to obtain platform access token")?;
        let token_task = TokenRefreshWorkload::new(platform.clone()).into_task(expires_in);
        self.registry.register(token_task, true)?;

        self.start_with(graph, platform)
    }

    /// Start one sync task per configured channel against the given collaborators
    pub fn start_with(&mut self, source: Arc<dyn StorySource>, platform: Arc<dyn PublishingPlatform>) -> Result<()> {
        debug!("SyncDaemon::start_with: called");
        for entry in &self.config.channels {
            let task = create_story_sync_task(
                entry.channel.clone(),
                &entry.sync,
                source.clone(),
                platform.clone(),
                self.state.clone(),
            )
            .context(format!("Failed to create sync task for channel {}", entry.channel.id))?;
            self.registry.register(task, true)?;
        }

        info!(tasks = ?self.registry.running_ids(), "SyncDaemon started");
        Ok(())
    }

    /// Stop every task, log final statistics and close the store
    pub async fn shutdown(mut self, grace: Duration) -> Result<()> {
        debug!(?grace, "SyncDaemon::shutdown: called");
        self.registry.shutdown(grace).await;

        for (id, stats) in self.registry.statistics() {
            match serde_json::to_string(&stats) {
                Ok(json) => info!(task = %id, stats = %json, "Final task statistics"),
                Err(e) => warn!(task = %id, error = %e, "Failed to serialize task statistics"),
            }
        }

        self.state.quit().await.context("Failed to close state store")?;
        info!("SyncDaemon shut down");
        Ok(())
    }
}
