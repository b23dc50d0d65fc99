use bridge_traits::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

use crate::retry::RetryExhausted;

/// Terminal outcome of scanning one channel.
///
/// Every variant except `RateLimited` and `Provider` may leave items on disk;
/// `processed` reports how many were persisted before the failure.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Flood control while opening the channel. The coordinator waits and retries the whole channel once.
    #[error("rate limited while opening channel, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider error: {0}")]
    Provider(BridgeError),

    #[error("feed pagination failed after {processed} items: {source}")]
    Feed {
        processed: usize,
        #[source]
        source: RetryExhausted,
    },

    #[error("item log I/O failed after {processed} items: {source}")]
    Io {
        processed: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("scan cancelled after {processed} items")]
    Cancelled { processed: usize },
}

impl ScanError {
    /// Items persisted before the scan stopped.
    pub fn processed(&self) -> usize {
        match self {
            Self::RateLimited { .. } | Self::Provider(_) => 0,
            Self::Feed { processed, .. }
            | Self::Io { processed, .. }
            | Self::Cancelled { processed } => *processed,
        }
    }
}

impl From<BridgeError> for ScanError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            other => Self::Provider(other),
        }
    }
}

/// Run-level failures. Per-channel problems never surface here; they end up in the manifest.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no channels provided")]
    NoChannels,

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("failed to write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
