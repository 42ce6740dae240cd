//! Data types for ingestion jobs.
//!
//! `JobRecord` is the tracker's view of one sync run. It is built from the
//! backend's `SyncResponse` wire shape and only ever replaced as a whole.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Which pages a sync run should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncType {
    #[serde(rename = "FULL", alias = "full", alias = "Full")]
    Full,
    #[default]
    #[serde(rename = "INCREMENTAL", alias = "incremental", alias = "Incremental")]
    Incremental,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Incremental => "INCREMENTAL",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Full => Self::Incremental,
            Self::Incremental => Self::Full,
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown sync type {0:?} (expected \"full\" or \"incremental\")")]
pub struct ParseSyncTypeError(String);

impl FromStr for SyncType {
    type Err = ParseSyncTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            _ => Err(ParseSyncTypeError(s.to_string())),
        }
    }
}

/// Request body for starting a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub sync_type: SyncType,
    /// Space keys to restrict the run to. Empty means every space.
    pub spaces: Vec<String>,
    /// Page labels to restrict the run to. Empty means every tag.
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl JobConfig {
    /// Build a config from the free-text, comma-separated filter inputs the
    /// operator types in.
    pub fn from_filters(sync_type: SyncType, spaces: &str, tags: &str) -> Self {
        Self {
            sync_type,
            spaces: split_filters(spaces),
            tags: split_filters(tags),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }
}

/// Split `"ENG, OPS,,"` into `["ENG", "OPS"]`.
pub fn split_filters(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Backend-assigned sync identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for compact display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of one sync run.
///
/// `completed_at` is present exactly when `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub discovered: u64,
    pub processed: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Fresh record for a run the backend just accepted.
    pub fn started(id: JobId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Running,
            message: String::new(),
            discovered: 0,
            processed: 0,
            failed: 0,
            started_at,
            completed_at: None,
        }
    }

    /// Processed pages as a whole percentage of discovered pages.
    ///
    /// Returns 0 when nothing has been discovered yet. The backend does not
    /// guarantee `processed <= discovered`, so the result is clamped.
    pub fn progress_percent(&self) -> u8 {
        if self.discovered == 0 {
            return 0;
        }
        let pct = (self.processed as f64 / self.discovered as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Enforce the `completed_at` / terminal-status pairing.
    pub fn normalized(mut self, observed_at: DateTime<Utc>) -> Self {
        if self.status.is_terminal() {
            self.completed_at.get_or_insert(observed_at);
        } else {
            self.completed_at = None;
        }
        self
    }

    /// Apply a newer snapshot on top of this one.
    ///
    /// The incoming record replaces this one, except that a terminal record
    /// is final and the page counters never move backwards.
    pub fn merged_with(&self, incoming: JobRecord) -> JobRecord {
        if self.status.is_terminal() {
            return self.clone();
        }

        JobRecord {
            id: self.id.clone(),
            started_at: self.started_at,
            discovered: incoming.discovered.max(self.discovered),
            processed: incoming.processed.max(self.processed),
            failed: incoming.failed.max(self.failed),
            ..incoming
        }
    }
}

/// Wire shape of the backend's sync status responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub sync_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pages_fetched: Option<u64>,
    #[serde(default)]
    pub pages_processed: Option<u64>,
    #[serde(default)]
    pub pages_failed: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncResponse {
    /// Convert into a normalized record. Missing fields fall back to zero
    /// counts, an empty message, and `observed_at` for timestamps.
    pub fn into_record(self, observed_at: DateTime<Utc>) -> JobRecord {
        JobRecord {
            id: self.sync_id,
            status: self.status,
            message: self.message.unwrap_or_default(),
            discovered: self.pages_fetched.unwrap_or(0),
            processed: self.pages_processed.unwrap_or(0),
            failed: self.pages_failed.unwrap_or(0),
            started_at: self.started_at.unwrap_or(observed_at),
            completed_at: self.completed_at,
        }
        .normalized(observed_at)
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO date-time taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}"))),
    }
}
