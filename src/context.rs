use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ClientError;
use crate::jobs::{HttpJobClient, JobConfig, JobStatusClient, JobTracker};

/// Shared application state built once from configuration.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub client: Arc<dyn JobStatusClient>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self, ClientError> {
        let client = HttpJobClient::with_timeout(config.api_url.clone(), config.request_timeout())?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    pub fn with_client(config: AppConfig, client: Arc<dyn JobStatusClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    /// A fresh tracker using the configured poll policy.
    pub fn tracker(&self) -> JobTracker {
        JobTracker::new(Arc::clone(&self.client), self.config.poll_policy())
    }

    /// Job config prefilled from the configured defaults.
    pub fn default_job_config(&self) -> JobConfig {
        JobConfig::from_filters(
            self.config.default_sync_type,
            &self.config.default_spaces,
            &self.config.default_tags,
        )
    }
}
