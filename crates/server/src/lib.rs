//! WebSocket server for transferit.
//!
//! Accepts any number of concurrent connections, dispatches JSON request
//! envelopes to a [`Handler`], and manages each connection's lifecycle
//! (ping/pong, graceful shutdown). [`TransferService`] is the handler that
//! serves the chunk handoff from a [`TransferCoordinator`].
//!
//! [`TransferCoordinator`]: transferit_transfer::TransferCoordinator

mod connection;
mod handler;
mod server;
mod service;

pub use connection::{SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::{ServerConfig, TransferServer};
pub use service::{TransferService, error_code};

/// Per-connection send buffer capacity.
///
/// Every request produces exactly one response, so this only needs to
/// cover requests a client pipelines on one connection.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the transfer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
