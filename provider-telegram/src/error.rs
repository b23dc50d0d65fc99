//! Error types for the Telegram gateway provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Telegram gateway errors
#[derive(Error, Debug)]
pub enum TelegramError {
    /// Flood control: the gateway asks us to wait before the next request
    #[error("Flood wait of {seconds} seconds requested")]
    FloodWait { seconds: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The gateway refused the request (bad credentials, private channel, ...)
    #[error("Gateway rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Gateway error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Failed to parse gateway response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for Telegram gateway operations
pub type Result<T> = std::result::Result<T, TelegramError>;

impl From<TelegramError> for BridgeError {
    fn from(error: TelegramError) -> Self {
        match error {
            TelegramError::FloodWait { seconds } => BridgeError::RateLimited {
                retry_after_secs: seconds,
            },
            TelegramError::NotFound(what) => BridgeError::NotFound(what),
            TelegramError::Rejected { status, message } => BridgeError::Rejected { status, message },
            TelegramError::Server { status, message } => {
                BridgeError::OperationFailed(format!("Gateway error (status {}): {}", status, message))
            }
            TelegramError::ParseError(msg) => BridgeError::InvalidResponse(msg),
            TelegramError::Bridge(e) => e,
        }
    }
}
