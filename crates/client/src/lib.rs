//! Client side of transferit.
//!
//! [`WsClient`] speaks the envelope protocol, [`TransferClient`] adds one
//! typed call per operation, and [`upload_file`] / [`download_file`]
//! drive a whole file through the server's single-chunk slot.

mod client;
mod files;
mod progress;
mod pumps;
mod retry;
mod ws_client;

pub use client::TransferClient;
pub use files::{
    ProgressCallback, TransferOptions, TransferProgress, TransferSummary, download_file,
    upload_file,
};
pub use progress::SpeedCalculator;
pub use retry::RetryConfig;
pub use ws_client::WsClient;

use tokio_tungstenite::tungstenite;
use transferit_protocol::constants::is_retryable_code;
use transferit_protocol::envelope::WsError;
use transferit_transfer::TransferError;

/// Errors from the transfer client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    /// The server rejected the request with a wire error.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    /// Local file or chunk sequencing failure.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Returns `true` for server rejections that clear up on their own
    /// (slot occupied, slot empty, chunk not yet available).
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Server { code, .. } => is_retryable_code(*code),
            _ => false,
        }
    }

    /// Wire error code for server rejections.
    pub fn server_code(&self) -> Option<i32> {
        match self {
            ClientError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<WsError> for ClientError {
    fn from(err: WsError) -> Self {
        ClientError::Server {
            code: err.code,
            message: err.message,
        }
    }
}
