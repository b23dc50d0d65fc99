//! Channel list handling.
//!
//! Channels come from a plain text file (one handle per line, `#` comments) and
//! from the command line. Both sources are merged keeping the first occurrence
//! of each handle.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// Parse a channel list, ignoring blank lines and `#` comments.
pub fn parse_channel_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load channels from `path`. A missing file yields an empty list.
pub fn load_channels_file(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        debug!(path = %path.display(), "Channels file not found, skipping");
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)?;
    Ok(parse_channel_list(&text))
}

/// Deduplicate channels keeping first-occurrence order. Blank entries are dropped.
pub fn dedup_channels<I, S>(channels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    channels
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}
