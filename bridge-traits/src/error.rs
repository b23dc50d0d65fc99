use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    /// Transport-level failure (timeouts, connection resets, 5xx responses).
    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Provider flood control. The caller must wait before the next call.
    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether repeating the same call may succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OperationFailed(_) | Self::Io(_))
    }

    /// Provider-requested wait in seconds, if this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
