use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for any incoming frame before a connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings (must be well below [`WS_PONG_WAIT`]).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Largest WebSocket message either side ever accepts (64 MiB).
///
/// Clients use it as their receive limit. A server's limit is derived from
/// its chunk size with [`server_message_limit`] and never exceeds this.
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Floor for a server's message limit (16 MiB).
pub const WS_MIN_MESSAGE_LIMIT: usize = 16 * 1024 * 1024;

/// Room reserved for the JSON envelope around a base64 chunk.
pub const WS_ENVELOPE_OVERHEAD: usize = 4 * 1024;

/// Size of a chunk message carrying `chunk_size` raw bytes.
pub const fn encoded_message_size(chunk_size: usize) -> usize {
    chunk_size
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(WS_ENVELOPE_OVERHEAD)
}

/// Message limit for a server accepting chunks of up to `max_chunk_size`.
///
/// Oversize uploads up to four times the maximum still arrive in full so
/// they can be answered with a chunk-too-large error instead of a dropped
/// connection.
pub fn server_message_limit(max_chunk_size: usize) -> usize {
    encoded_message_size(max_chunk_size.saturating_mul(4))
        .clamp(WS_MIN_MESSAGE_LIMIT, WS_MAX_MESSAGE_SIZE)
}

/// Timeout for a single request/response round trip.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default TCP port of the transfer server.
pub const DEFAULT_PORT: u16 = 8083;

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from client to server
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "init_upload")]
    InitUpload,
    #[serde(rename = "upload_chunk")]
    UploadChunk,
    #[serde(rename = "download_chunk")]
    DownloadChunk,
    #[serde(rename = "confirm_chunk_downloaded")]
    ConfirmChunkDownloaded,
    #[serde(rename = "get_current_segment_number")]
    GetCurrentSegmentNumber,
    #[serde(rename = "get_transfer_status")]
    GetTransferStatus,

    // Responses from server to client
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "init_upload_response")]
    InitUploadResponse,
    #[serde(rename = "upload_chunk_response")]
    UploadChunkResponse,
    #[serde(rename = "download_chunk_response")]
    DownloadChunkResponse,
    #[serde(rename = "confirm_chunk_downloaded_response")]
    ConfirmChunkDownloadedResponse,
    #[serde(rename = "current_segment_number_response")]
    CurrentSegmentNumberResponse,
    #[serde(rename = "transfer_status_response")]
    TransferStatusResponse,
    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Malformed request: bad JSON, missing payload, empty or unparsable
/// transfer id, negative chunk number.
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
/// The transfer id is not registered.
pub const WS_ERR_CODE_UNKNOWN_TRANSFER: i32 = 404;
/// A chunk is already pending; retry the upload later.
pub const WS_ERR_CODE_SLOT_OCCUPIED: i32 = 409;
/// Nothing uploaded yet for the queried transfer.
pub const WS_ERR_CODE_NOT_INITIALIZED: i32 = 412;
/// The chunk exceeds the server's maximum chunk size.
pub const WS_ERR_CODE_CHUNK_TOO_LARGE: i32 = 413;
/// The requested chunk is not the pending one; retry the download later.
pub const WS_ERR_CODE_CHUNK_NOT_AVAILABLE: i32 = 416;
/// The uploaded chunk number is not the expected next one.
pub const WS_ERR_CODE_OUT_OF_ORDER: i32 = 422;
/// No chunk is pending; retry the download later.
pub const WS_ERR_CODE_SLOT_EMPTY: i32 = 425;
pub const WS_ERR_CODE_INTERNAL: i32 = 500;
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

/// Returns `true` for error codes that report a transient condition the
/// caller should retry with the same arguments.
pub fn is_retryable_code(code: i32) -> bool {
    matches!(
        code,
        WS_ERR_CODE_SLOT_OCCUPIED | WS_ERR_CODE_SLOT_EMPTY | WS_ERR_CODE_CHUNK_NOT_AVAILABLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::InitUpload).unwrap(),
            "\"init_upload\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::ConfirmChunkDownloaded).unwrap(),
            "\"confirm_chunk_downloaded\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::CurrentSegmentNumberResponse).unwrap(),
            "\"current_segment_number_response\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"download_chunk\"").unwrap();
        assert_eq!(mt, MessageType::DownloadChunk);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"some_future_type\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }

    #[test]
    fn retryable_codes() {
        assert!(is_retryable_code(WS_ERR_CODE_SLOT_OCCUPIED));
        assert!(is_retryable_code(WS_ERR_CODE_SLOT_EMPTY));
        assert!(is_retryable_code(WS_ERR_CODE_CHUNK_NOT_AVAILABLE));

        assert!(!is_retryable_code(WS_ERR_CODE_UNKNOWN_TRANSFER));
        assert!(!is_retryable_code(WS_ERR_CODE_OUT_OF_ORDER));
        assert!(!is_retryable_code(WS_ERR_CODE_CHUNK_TOO_LARGE));
        assert!(!is_retryable_code(WS_ERR_CODE_NOT_INITIALIZED));
        assert!(!is_retryable_code(WS_ERR_CODE_BAD_REQUEST));
    }

    #[test]
    fn encoded_size_covers_base64() {
        assert_eq!(encoded_message_size(0), WS_ENVELOPE_OVERHEAD);
        assert_eq!(encoded_message_size(1), 4 + WS_ENVELOPE_OVERHEAD);
        assert_eq!(encoded_message_size(3), 4 + WS_ENVELOPE_OVERHEAD);
        assert_eq!(encoded_message_size(4), 8 + WS_ENVELOPE_OVERHEAD);
        assert_eq!(encoded_message_size(usize::MAX), usize::MAX);
    }

    #[test]
    fn server_limit_leaves_room_for_oversize_chunks() {
        // 3.5 MiB maximum, 13 MiB upload: must arrive whole.
        let max_chunk = 3 * 1024 * 1024 + 512 * 1024;
        let limit = server_message_limit(max_chunk);
        assert!(limit > encoded_message_size(13 * 1024 * 1024));
        assert!(limit > encoded_message_size(max_chunk));

        assert_eq!(server_message_limit(16), WS_MIN_MESSAGE_LIMIT);
        assert_eq!(server_message_limit(usize::MAX), WS_MAX_MESSAGE_SIZE);
    }
}
