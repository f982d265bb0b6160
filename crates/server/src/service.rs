//! [`Handler`] that serves the chunk handoff from a [`TransferCoordinator`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use transferit_protocol::MessageType;
use transferit_protocol::constants::{
    WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_CHUNK_NOT_AVAILABLE, WS_ERR_CODE_CHUNK_TOO_LARGE,
    WS_ERR_CODE_INTERNAL, WS_ERR_CODE_NOT_INITIALIZED, WS_ERR_CODE_OUT_OF_ORDER,
    WS_ERR_CODE_SLOT_EMPTY, WS_ERR_CODE_SLOT_OCCUPIED, WS_ERR_CODE_UNKNOWN_TRANSFER,
};
use transferit_protocol::envelope::Message;
use transferit_protocol::messages::{
    ConfirmChunkDownloadedRequest, ConfirmChunkDownloadedResponse, CurrentSegmentNumberResponse,
    DownloadChunkRequest, DownloadChunkResponse, GetCurrentSegmentNumberRequest,
    GetTransferStatusRequest, InitUploadResponse, TransferStatusResponse, UploadChunkRequest,
    UploadChunkResponse,
};
use transferit_transfer::{
    ShardedRegistry, TransferCoordinator, TransferError, TransferId, TransferRegistry,
};

use crate::connection::Sender;
use crate::handler::{Handler, HandlerFuture};

/// Maps a [`TransferError`] to its wire error code.
pub fn error_code(err: &TransferError) -> i32 {
    match err {
        TransferError::UnknownTransfer(_) => WS_ERR_CODE_UNKNOWN_TRANSFER,
        TransferError::SlotOccupied { .. } => WS_ERR_CODE_SLOT_OCCUPIED,
        TransferError::OutOfOrderChunk { .. } => WS_ERR_CODE_OUT_OF_ORDER,
        TransferError::ChunkTooLarge { .. } => WS_ERR_CODE_CHUNK_TOO_LARGE,
        TransferError::SlotEmpty => WS_ERR_CODE_SLOT_EMPTY,
        TransferError::ChunkNotAvailable { .. } => WS_ERR_CODE_CHUNK_NOT_AVAILABLE,
        TransferError::NotInitialized => WS_ERR_CODE_NOT_INITIALIZED,
        TransferError::InvalidRequest(_) => WS_ERR_CODE_BAD_REQUEST,
        TransferError::Io(_) => WS_ERR_CODE_INTERNAL,
    }
}

/// A request that cannot be answered with a success response.
#[derive(Debug)]
struct Rejection {
    code: i32,
    message: String,
}

impl Rejection {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: WS_ERR_CODE_BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TransferError> for Rejection {
    fn from(err: TransferError) -> Self {
        Self {
            code: error_code(&err),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Rejection {
    fn from(err: serde_json::Error) -> Self {
        Self {
            code: WS_ERR_CODE_INTERNAL,
            message: format!("encode response: {err}"),
        }
    }
}

/// Serves every transfer operation from a shared coordinator.
pub struct TransferService<R: TransferRegistry = ShardedRegistry> {
    coordinator: Arc<TransferCoordinator<R>>,
}

impl<R: TransferRegistry> TransferService<R> {
    pub fn new(coordinator: Arc<TransferCoordinator<R>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<TransferCoordinator<R>> {
        &self.coordinator
    }

    fn init_upload(&self, msg: &Message) -> Result<Message, Rejection> {
        let id = self.coordinator.init_upload();
        let resp = InitUploadResponse {
            transfer_id: id.to_string(),
        };
        Ok(msg.reply(MessageType::InitUploadResponse, Some(&resp))?)
    }

    fn upload_chunk(&self, msg: &Message) -> Result<Message, Rejection> {
        let req: UploadChunkRequest = payload(msg)?;
        let id = parse_transfer_id(&req.transfer_id)?;
        self.coordinator
            .upload_chunk(&id, req.chunk_number, req.data, req.is_last)?;

        let resp = UploadChunkResponse {
            chunk_number: req.chunk_number,
        };
        Ok(msg.reply(MessageType::UploadChunkResponse, Some(&resp))?)
    }

    fn download_chunk(&self, msg: &Message) -> Result<Message, Rejection> {
        let req: DownloadChunkRequest = payload(msg)?;
        let id = parse_transfer_id(&req.transfer_id)?;
        let chunk = self.coordinator.download_chunk(&id, req.chunk_number)?;

        let resp = DownloadChunkResponse {
            transfer_id: req.transfer_id,
            chunk_number: req.chunk_number,
            data: chunk.data.clone(),
            is_last: chunk.is_last,
        };
        Ok(msg.reply(MessageType::DownloadChunkResponse, Some(&resp))?)
    }

    /// Confirmations never fail once the payload decodes; an unparsable
    /// id is treated like an unknown transfer.
    fn confirm_chunk_downloaded(&self, msg: &Message) -> Result<Message, Rejection> {
        let req: ConfirmChunkDownloadedRequest = payload(msg)?;
        match parse_transfer_id(&req.transfer_id) {
            Ok(id) => self
                .coordinator
                .confirm_chunk_downloaded(&id, req.chunk_number),
            Err(rejection) => {
                tracing::warn!(
                    transfer_id = %req.transfer_id,
                    chunk_number = req.chunk_number,
                    "ignoring confirmation: {}",
                    rejection.message
                );
            }
        }

        let resp = ConfirmChunkDownloadedResponse {
            chunk_number: req.chunk_number,
        };
        Ok(msg.reply(MessageType::ConfirmChunkDownloadedResponse, Some(&resp))?)
    }

    fn current_segment_number(&self, msg: &Message) -> Result<Message, Rejection> {
        let req: GetCurrentSegmentNumberRequest = payload(msg)?;
        let id = parse_transfer_id(&req.transfer_id)?;
        let number = self.coordinator.current_segment_number(&id)?;

        let resp = CurrentSegmentNumberResponse {
            chunk_number: to_wire(number),
        };
        Ok(msg.reply(MessageType::CurrentSegmentNumberResponse, Some(&resp))?)
    }

    fn transfer_status(&self, msg: &Message) -> Result<Message, Rejection> {
        let req: GetTransferStatusRequest = payload(msg)?;
        let id = parse_transfer_id(&req.transfer_id)?;
        let snapshot = self.coordinator.transfer_status(&id)?;

        let resp = TransferStatusResponse {
            transfer_id: req.transfer_id,
            pending_chunk_number: snapshot.pending_chunk_number.map(to_wire),
            last_consumed_number: snapshot.last_consumed_number.map(to_wire),
            uploaded_chunks: snapshot.uploaded_chunks,
            uploaded_bytes: snapshot.uploaded_bytes,
        };
        Ok(msg.reply(MessageType::TransferStatusResponse, Some(&resp))?)
    }
}

impl<R: TransferRegistry + 'static> Handler for TransferService<R> {
    fn on_init_upload(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.init_upload(&msg)) })
    }

    fn on_upload_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.upload_chunk(&msg)) })
    }

    fn on_download_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.download_chunk(&msg)) })
    }

    fn on_confirm_chunk_downloaded(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.confirm_chunk_downloaded(&msg)) })
    }

    fn on_get_current_segment_number(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.current_segment_number(&msg)) })
    }

    fn on_get_transfer_status(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move { respond(&sender, &msg, self.transfer_status(&msg)) })
    }
}

fn respond(sender: &Sender, req: &Message, result: Result<Message, Rejection>) {
    let reply = match result {
        Ok(reply) => reply,
        Err(rejection) => {
            tracing::debug!(
                id = %req.id,
                msg_type = ?req.msg_type,
                code = rejection.code,
                "request rejected: {}",
                rejection.message
            );
            req.reply_error(rejection.code, rejection.message)
        }
    };
    let _ = sender.send_msg(reply);
}

fn payload<T: DeserializeOwned>(msg: &Message) -> Result<T, Rejection> {
    msg.parse_payload()
        .map_err(|e| Rejection::bad_request(format!("invalid payload: {e}")))?
        .ok_or_else(|| Rejection::bad_request("missing payload"))
}

fn parse_transfer_id(text: &str) -> Result<TransferId, Rejection> {
    if text.is_empty() {
        return Err(Rejection::bad_request("empty transfer id"));
    }
    text.parse()
        .map_err(|e| Rejection::bad_request(format!("invalid transfer id {text:?}: {e}")))
}

fn to_wire(number: u64) -> i64 {
    i64::try_from(number).unwrap_or(i64::MAX)
}
