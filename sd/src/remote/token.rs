//! Periodic renewal of the platform access token

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::TokenSource;
use crate::task::{CycleOutcome, SchedulingPolicy, SelfRegulatingConfig, Task, Workload};

/// Registry id of the token refresh task
pub const TOKEN_REFRESH_TASK_ID: &str = "platform_token_refresh";

/// Never refresh more often than this
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(60);

/// Refresh after two thirds of the token lifetime
pub fn refresh_delay(expires_in: Duration) -> Duration {
    (expires_in * 2 / 3).max(MIN_REFRESH_DELAY)
}

/// Self-regulating workload renewing a token before it expires
pub struct TokenRefreshWorkload {
    source: Arc<dyn TokenSource>,
}

impl TokenRefreshWorkload {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }

    /// Wrap in a task whose first run is scheduled from the current token's lifetime
    pub fn into_task(self, expires_in: Duration) -> Task {
        debug!(?expires_in, "TokenRefreshWorkload::into_task: called");
        let policy = SchedulingPolicy::self_regulating(SelfRegulatingConfig {
            first_delay: Some(refresh_delay(expires_in)),
        });
        Task::new(TOKEN_REFRESH_TASK_ID, policy, self)
    }
}

#[async_trait]
impl Workload for TokenRefreshWorkload {
    async fn run(&mut self) -> eyre::Result<CycleOutcome> {
        info!("Refreshing platform access token");
        let expires_in = self.source.refresh_token().await?;
        Ok(CycleOutcome::run_again_in(refresh_delay(expires_in)))
    }
}
