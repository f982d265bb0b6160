use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::registry::{ShardedRegistry, TransferRegistry};
use crate::session::{ConfirmOutcome, SessionSnapshot};
use crate::types::{Chunk, TransferId};
use crate::{DEFAULT_MAX_CHUNK_SIZE, TransferError};

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Largest accepted chunk payload in bytes.
    pub max_chunk_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Operation surface of the chunk handoff.
///
/// Validates requests, resolves the transfer in the registry and applies
/// the matching session transition. Chunk numbers arrive signed, as they
/// do on the wire, and are rejected when negative.
pub struct TransferCoordinator<R: TransferRegistry = ShardedRegistry> {
    registry: R,
    config: CoordinatorConfig,
}

impl TransferCoordinator<ShardedRegistry> {
    /// Creates a coordinator backed by a [`ShardedRegistry`].
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_registry(ShardedRegistry::new(), config)
    }
}

impl<R: TransferRegistry> TransferCoordinator<R> {
    pub fn with_registry(registry: R, config: CoordinatorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of transfers started since the coordinator was created.
    pub fn active_transfers(&self) -> usize {
        self.registry.len()
    }

    /// Starts a new transfer with an empty slot.
    pub fn init_upload(&self) -> TransferId {
        let id = self.registry.create();
        debug!(transfer = %id, "transfer initialized");
        id
    }

    /// Offers chunk `chunk_number` of transfer `id`.
    pub fn upload_chunk(
        &self,
        id: &TransferId,
        chunk_number: i64,
        data: Vec<u8>,
        is_last: bool,
    ) -> Result<(), TransferError> {
        validate_id(id)?;
        let number = validate_chunk_number(chunk_number)?;
        let size = data.len();
        let max = self.config.max_chunk_size;

        self.registry
            .with_session(id, |s| s.upload(Chunk::new(number, data, is_last), max))??;

        trace!(transfer = %id, chunk = number, size, is_last, "chunk uploaded");
        Ok(())
    }

    /// Returns pending chunk `chunk_number` of transfer `id` without
    /// consuming it.
    pub fn download_chunk(
        &self,
        id: &TransferId,
        chunk_number: i64,
    ) -> Result<Arc<Chunk>, TransferError> {
        validate_id(id)?;
        let number = validate_chunk_number(chunk_number)?;
        self.registry.with_session(id, |s| s.download(number))?
    }

    /// Releases chunk `chunk_number` of transfer `id`.
    ///
    /// Always succeeds: unknown transfers, empty slots, stale numbers and
    /// malformed arguments are logged and ignored so that redelivered
    /// confirmations never fail the protocol.
    pub fn confirm_chunk_downloaded(&self, id: &TransferId, chunk_number: i64) {
        let number = match validate_id(id).and_then(|()| validate_chunk_number(chunk_number)) {
            Ok(n) => n,
            Err(e) => {
                warn!(transfer = %id, chunk_number, "ignoring confirmation: {e}");
                return;
            }
        };

        match self.registry.with_session(id, |s| s.confirm(number)) {
            Ok(ConfirmOutcome::Consumed) => {
                trace!(transfer = %id, chunk = number, "chunk confirmed");
            }
            Ok(ConfirmOutcome::NothingPending) => {
                debug!(transfer = %id, chunk = number, "duplicate confirmation, slot empty");
            }
            Ok(ConfirmOutcome::Stale { pending }) => {
                debug!(transfer = %id, chunk = number, pending, "stale confirmation ignored");
            }
            Err(e) => {
                warn!(transfer = %id, chunk = number, "confirmation for unknown transfer: {e}");
            }
        }
    }

    /// Number of the chunk pending in transfer `id`.
    pub fn current_segment_number(&self, id: &TransferId) -> Result<u64, TransferError> {
        validate_id(id)?;
        self.registry.with_session(id, |s| s.current_segment_number())?
    }

    /// Diagnostic snapshot of transfer `id`.
    pub fn transfer_status(&self, id: &TransferId) -> Result<SessionSnapshot, TransferError> {
        validate_id(id)?;
        self.registry.with_session(id, |s| s.snapshot())
    }
}

fn validate_id(id: &TransferId) -> Result<(), TransferError> {
    if id.is_nil() {
        return Err(TransferError::InvalidRequest("empty transfer id".into()));
    }
    Ok(())
}

fn validate_chunk_number(chunk_number: i64) -> Result<u64, TransferError> {
    u64::try_from(chunk_number).map_err(|_| {
        TransferError::InvalidRequest(format!("negative chunk number: {chunk_number}"))
    })
}
