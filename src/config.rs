use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::jobs::{PollPolicy, SyncType};

pub const DEFAULT_CONFIG_FILE: &str = "syncwatch.toml";
pub const ENV_PREFIX: &str = "SYNCWATCH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the ingestion backend, including any `/api` prefix.
    pub api_url: String,
    pub poll_interval_ms: u64,
    pub poll_max_retries: u32,
    pub poll_retry_base_ms: u64,
    pub poll_retry_max_ms: u64,
    /// Overall HTTP request timeout. Unset leaves the transport defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub default_sync_type: SyncType,
    /// Comma-separated space keys prefilled in new syncs.
    pub default_spaces: String,
    /// Comma-separated tags prefilled in new syncs.
    pub default_tags: String,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            poll_interval_ms: policy.period.as_millis() as u64,
            poll_max_retries: policy.max_retries,
            poll_retry_base_ms: policy.retry_base.as_millis() as u64,
            poll_retry_max_ms: policy.retry_max_delay.as_millis() as u64,
            request_timeout_secs: None,
            default_sync_type: SyncType::Incremental,
            default_spaces: "ENG,OPS".to_string(),
            default_tags: "rca,post-mortem".to_string(),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration, later sources overriding earlier ones:
    /// built-in defaults, the TOML file, `SYNCWATCH_*` environment
    /// variables, then `overrides` (typically parsed CLI flags).
    ///
    /// An explicit `config_path` must exist; the default file is optional.
    pub fn load<T: Serialize>(
        config_path: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        figment = match config_path {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        reqwest::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("api_url {:?}: {}", self.api_url, e)))?;

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            period: Duration::from_millis(self.poll_interval_ms),
            max_retries: self.poll_max_retries,
            retry_base: Duration::from_millis(self.poll_retry_base_ms),
            retry_max_delay: Duration::from_millis(self.poll_retry_max_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
