use std::sync::Arc;

use crate::TransferError;
use crate::types::Chunk;

/// The single-chunk buffer of a transfer.
#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Full(Arc<Chunk>),
}

/// Handoff state of one transfer: at most one chunk in flight.
///
/// The slot cycles `Empty -> Full(n) -> Empty` through
/// [`upload`](Self::upload) and [`confirm`](Self::confirm); chunk numbers
/// start at 0 and each accepted upload must be exactly one past the last
/// confirmed chunk. The session is not synchronized itself; the registry
/// serializes all access to it.
#[derive(Debug, Default)]
pub struct TransferSession {
    slot: Slot,
    last_consumed: Option<u64>,
    uploaded_chunks: u64,
    uploaded_bytes: u64,
}

/// Point-in-time view of a session, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub pending_chunk_number: Option<u64>,
    pub last_consumed_number: Option<u64>,
    pub uploaded_chunks: u64,
    pub uploaded_bytes: u64,
}

/// What a confirmation did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The pending chunk was released; the slot is empty again.
    Consumed,
    /// Nothing was pending (duplicate or late confirmation).
    NothingPending,
    /// A different chunk is pending; left untouched.
    Stale { pending: u64 },
}

impl TransferSession {
    /// Creates an empty session; the first accepted chunk will be number 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next upload must carry.
    pub fn expected_next(&self) -> u64 {
        self.last_consumed.map_or(0, |n| n + 1)
    }

    /// Number of the chunk occupying the slot, if any.
    pub fn pending_chunk_number(&self) -> Option<u64> {
        match &self.slot {
            Slot::Empty => None,
            Slot::Full(chunk) => Some(chunk.number),
        }
    }

    /// Number of the most recently confirmed chunk, if any.
    pub fn last_consumed_number(&self) -> Option<u64> {
        self.last_consumed
    }

    /// Places `chunk` into the empty slot.
    ///
    /// Rejections leave the session unchanged.
    pub fn upload(&mut self, chunk: Chunk, max_chunk_size: usize) -> Result<(), TransferError> {
        if chunk.size() > max_chunk_size {
            return Err(TransferError::ChunkTooLarge {
                size: chunk.size(),
                max: max_chunk_size,
            });
        }

        if let Slot::Full(pending) = &self.slot {
            return Err(TransferError::SlotOccupied {
                pending: pending.number,
            });
        }

        let expected = self.expected_next();
        if chunk.number != expected {
            return Err(TransferError::OutOfOrderChunk {
                expected,
                got: chunk.number,
            });
        }

        self.uploaded_chunks += 1;
        self.uploaded_bytes += chunk.size() as u64;
        self.slot = Slot::Full(Arc::new(chunk));
        Ok(())
    }

    /// Returns the pending chunk if it is `number`. Does not consume it.
    pub fn download(&self, number: u64) -> Result<Arc<Chunk>, TransferError> {
        match &self.slot {
            Slot::Empty => Err(TransferError::SlotEmpty),
            Slot::Full(chunk) if chunk.number != number => Err(TransferError::ChunkNotAvailable {
                requested: number,
                pending: chunk.number,
            }),
            Slot::Full(chunk) => Ok(Arc::clone(chunk)),
        }
    }

    /// Releases pending chunk `number`, freeing the slot for the next upload.
    ///
    /// Never fails: confirming an empty slot or a chunk other than the
    /// pending one changes nothing.
    pub fn confirm(&mut self, number: u64) -> ConfirmOutcome {
        match &self.slot {
            Slot::Empty => ConfirmOutcome::NothingPending,
            Slot::Full(chunk) if chunk.number != number => ConfirmOutcome::Stale {
                pending: chunk.number,
            },
            Slot::Full(_) => {
                self.slot = Slot::Empty;
                self.last_consumed = Some(number);
                ConfirmOutcome::Consumed
            }
        }
    }

    /// Number of the pending chunk; [`TransferError::NotInitialized`] when
    /// the slot is empty.
    pub fn current_segment_number(&self) -> Result<u64, TransferError> {
        self.pending_chunk_number().ok_or(TransferError::NotInitialized)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            pending_chunk_number: self.pending_chunk_number(),
            last_consumed_number: self.last_consumed,
            uploaded_chunks: self.uploaded_chunks,
            uploaded_bytes: self.uploaded_bytes,
        }
    }
}
