//! Client for the ingestion backend's sync endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::model::{JobConfig, JobId, JobRecord, SyncResponse};
use crate::error::ClientError;

/// The two backend operations the tracker depends on.
#[async_trait]
pub trait JobStatusClient: Send + Sync {
    /// Ask the backend to start a sync run. Returns the initial record.
    async fn start(&self, config: &JobConfig) -> Result<JobRecord, ClientError>;

    /// Fetch the full current state of a sync run.
    async fn poll(&self, id: &JobId) -> Result<JobRecord, ClientError>;
}

/// [`JobStatusClient`] over the backend's HTTP/JSON API.
pub struct HttpJobClient {
    base_url: String,
    client: reqwest::Client,
}

/// Error body shapes the backend may return. Spring's default error page
/// uses `error`, application errors use `message`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl HttpJobClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build a client with an overall per-request timeout. `None` leaves
    /// reqwest's defaults in place.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.into(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so an id can never step outside its own path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl JobStatusClient for HttpJobClient {
    async fn start(&self, config: &JobConfig) -> Result<JobRecord, ClientError> {
        let url = self.endpoint(&["v1", "ingestion", "sync"])?;
        debug!(method = "POST", url = %url, "API request");

        let response = self
            .client
            .post(url.clone())
            .json(config)
            .send()
            .await
            .inspect_err(|e| warn!(url = %url, error = %e, "API request failed"))?;

        let status = response.status();
        if status.is_success() {
            return read_record(response).await;
        }

        let message = error_message(response).await;
        warn!(url = %url, status = status.as_u16(), error = %message, "API error");

        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::Validation(message)
            }
            _ => ClientError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn poll(&self, id: &JobId) -> Result<JobRecord, ClientError> {
        let url = self.endpoint(&["v1", "ingestion", "sync", id.as_str()])?;
        debug!(method = "GET", url = %url, "API request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .inspect_err(|e| warn!(url = %url, error = %e, "API request failed"))?;

        let status = response.status();
        if status.is_success() {
            return read_record(response).await;
        }

        let message = error_message(response).await;
        warn!(url = %url, status = status.as_u16(), error = %message, "API error");

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(id.clone()),
            _ => ClientError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}

async fn read_record(response: reqwest::Response) -> Result<JobRecord, ClientError> {
    let body: SyncResponse = response.json().await?;
    Ok(body.into_record(Utc::now()))
}

/// Best-effort human-readable message from an error response.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    body.message
        .or(body.error)
        .filter(|m| !m.trim().is_empty())
        .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
}
