//! Append-only item log.
//!
//! One JSON object per line, partitioned by (date, channel). Lines are only ever
//! appended, so a torn write from a crashed run can corrupt at most its own line.
//! Readers skip such lines and report why.

use bridge_traits::FeedMessage;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Why a stored line was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// Not valid UTF-8 or not a JSON object
    InvalidJson,
    MissingId,
    /// `id` present but not an integer
    NonIntegerId,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingId => "missing_id",
            Self::NonIntegerId => "non_integer_id",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A well-formed stored line.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemLine {
    pub id: i64,
    pub record: Value,
}

impl ItemLine {
    /// `date` field as stored, if any
    pub fn date(&self) -> Option<&str> {
        self.record.get("date").and_then(Value::as_str)
    }
}

/// Parse one stored line.
pub fn parse_item_line(line: &[u8]) -> Result<ItemLine, SkipReason> {
    let record: Value = serde_json::from_slice(line).map_err(|_| SkipReason::InvalidJson)?;
    if !record.is_object() {
        return Err(SkipReason::InvalidJson);
    }

    let id = match record.get("id") {
        None | Some(Value::Null) => return Err(SkipReason::MissingId),
        Some(value) => value.as_i64().ok_or(SkipReason::NonIntegerId)?,
    };

    Ok(ItemLine { id, record })
}

/// Split a log file's contents into non-blank lines.
pub fn split_lines(contents: &[u8]) -> impl Iterator<Item = &[u8]> {
    contents
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
}

/// Append one item as a single line, creating the partition directory if needed.
pub async fn append_item(path: &Path, message: &FeedMessage) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}
