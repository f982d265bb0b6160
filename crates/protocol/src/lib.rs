//! Wire protocol shared by the transferit server and client.
//!
//! Every request and response is a JSON [`Message`] envelope sent as a
//! WebSocket text frame. Chunk bytes are base64-encoded inside payloads.

pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Message, WsError};
