//! Chunk handoff between one uploader and one downloader per transfer.
//!
//! The server never holds more than one chunk per transfer: an upload
//! fills the transfer's single slot, a download peeks at it, and a
//! confirmation empties it so the next upload can land. Every operation
//! is fail-fast; callers retry transient rejections themselves.
//!
//! [`ChunkReader`] and [`ChunkWriter`] are the file-side helpers clients
//! use to split a file into numbered chunks and reassemble it.

mod chunked;
mod coordinator;
mod registry;
mod session;
mod types;

pub use chunked::{ChunkReader, ChunkWriter};
pub use coordinator::{CoordinatorConfig, TransferCoordinator};
pub use registry::{CoarseRegistry, ShardedRegistry, TransferRegistry};
pub use session::{ConfirmOutcome, SessionSnapshot, TransferSession};
pub use types::{Chunk, IdentifierAllocator, RandomIdAllocator, TransferId};

/// Default client chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default largest chunk the server accepts: 3.5 MiB of raw bytes.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 3 * 1024 * 1024 + 512 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown transfer: {0}")]
    UnknownTransfer(TransferId),

    #[error("slot occupied by chunk {pending}")]
    SlotOccupied { pending: u64 },

    #[error("out of order chunk: expected {expected}, got {got}")]
    OutOfOrderChunk { expected: u64, got: u64 },

    #[error("chunk too large: {size} bytes (max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("no chunk pending")]
    SlotEmpty,

    #[error("chunk {requested} not available (pending {pending})")]
    ChunkNotAvailable { requested: u64, pending: u64 },

    #[error("transfer has no pending chunk yet")]
    NotInitialized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransferError {
    /// Returns `true` if the same call may succeed later without changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::SlotOccupied { .. }
                | TransferError::SlotEmpty
                | TransferError::ChunkNotAvailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(TransferError::SlotOccupied { pending: 0 }.is_transient());
        assert!(TransferError::SlotEmpty.is_transient());
        assert!(
            TransferError::ChunkNotAvailable {
                requested: 2,
                pending: 1
            }
            .is_transient()
        );

        assert!(!TransferError::NotInitialized.is_transient());
        assert!(!TransferError::OutOfOrderChunk { expected: 1, got: 3 }.is_transient());
        assert!(!TransferError::ChunkTooLarge { size: 10, max: 5 }.is_transient());
        assert!(!TransferError::UnknownTransfer(TransferId::nil()).is_transient());
    }

    #[test]
    fn error_display() {
        let err = TransferError::OutOfOrderChunk { expected: 1, got: 3 };
        assert_eq!(err.to_string(), "out of order chunk: expected 1, got 3");

        let err = TransferError::ChunkTooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "chunk too large: 10 bytes (max 5)");
    }
}
