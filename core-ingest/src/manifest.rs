//! Run manifest: the durable audit record of one scrape invocation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::scan::ScanOptions;

const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Terminal status of one channel within a run.
///
/// Serialized as `ok`, `ok_after_wait` or `error:<cause>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ChannelStatus {
    Ok,
    /// Succeeded on the single retry after a channel-level rate limit
    OkAfterWait,
    Error(String),
}

impl ChannelStatus {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::OkAfterWait => f.write_str("ok_after_wait"),
            Self::Error(cause) => write!(f, "error:{}", cause),
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "ok_after_wait" => Ok(Self::OkAfterWait),
            other => other
                .strip_prefix("error:")
                .map(|cause| Self::Error(cause.to_string()))
                .ok_or_else(|| format!("Invalid channel status: {}", other)),
        }
    }
}

impl From<ChannelStatus> for String {
    fn from(status: ChannelStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for ChannelStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub processed: usize,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub channels: Vec<String>,
    pub limit: Option<usize>,
    pub incremental: bool,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: BTreeMap<String, ChannelResult>,
}

impl RunManifest {
    pub fn new(
        run_id: String,
        channels: Vec<String>,
        options: &ScanOptions,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            channels,
            limit: options.limit,
            incremental: options.incremental,
            since: options.since,
            until: options.until,
            started_at,
            finished_at: None,
            results: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, channel: &str, processed: usize, status: ChannelStatus) {
        self.results
            .insert(channel.to_string(), ChannelResult { processed, status });
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    pub fn total_processed(&self) -> usize {
        self.results.values().map(|r| r.processed).sum()
    }

    /// Write as `<dir>/<run_id>.json` through a temporary file.
    pub async fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.json", self.run_id));
        let tmp = dir.join(format!(".{}.json.tmp", self.run_id));
        let body = serde_json::to_vec_pretty(self)?;

        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(path)
    }

    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let body = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Time-derived run id, suffixed with `-<n>` if a manifest with that id exists.
pub fn allocate_run_id(dir: &Path, started_at: DateTime<Utc>) -> String {
    let base = started_at.format(RUN_ID_FORMAT).to_string();
    let mut run_id = base.clone();
    let mut n = 1;

    while dir.join(format!("{}.json", run_id)).exists() {
        run_id = format!("{}-{}", base, n);
        n += 1;
    }

    run_id
}
