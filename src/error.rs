use thiserror::Error;

use crate::jobs::JobId;

/// Coarse classification of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backend rejected the request as malformed.
    Validation,
    /// Network failure or an unexpected backend response.
    Transport,
    /// The backend no longer knows the sync id.
    NotFound,
}

/// Errors returned by a [`JobStatusClient`](crate::jobs::JobStatusClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("sync request rejected: {0}")]
    Validation(String),

    #[error("sync {0} not found")]
    NotFound(JobId),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid backend url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidUrl { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transport(_) | Self::Status { .. } => ErrorKind::Transport,
        }
    }

    /// Whether polling again later could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
