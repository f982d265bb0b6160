use serde::de::DeserializeOwned;
use transferit_protocol::MessageType;
use transferit_protocol::envelope::Message;
use transferit_protocol::messages::{
    ConfirmChunkDownloadedRequest, CurrentSegmentNumberResponse, DownloadChunkRequest,
    DownloadChunkResponse, GetCurrentSegmentNumberRequest, GetTransferStatusRequest,
    InitUploadResponse, TransferStatusResponse, UploadChunkRequest,
};
use transferit_transfer::{Chunk, SessionSnapshot, TransferId};

use crate::ClientError;
use crate::ws_client::WsClient;

/// Typed access to every transfer operation over one connection.
///
/// Calls are not retried here; wrap them in [`RetryConfig::run`] where a
/// transient rejection should be waited out.
///
/// [`RetryConfig::run`]: crate::RetryConfig::run
pub struct TransferClient {
    ws: WsClient,
}

impl TransferClient {
    /// Connects to the server at `url`.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        Ok(Self::from_ws(WsClient::connect(url).await?))
    }

    pub fn from_ws(ws: WsClient) -> Self {
        Self { ws }
    }

    pub fn ws(&self) -> &WsClient {
        &self.ws
    }

    /// Round-trips a `ping`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let resp = self.ws.send_request::<()>(MessageType::Ping, None).await?;
        expect_type(&resp, MessageType::Pong)
    }

    /// Starts a new transfer and returns its identifier.
    pub async fn init_upload(&self) -> Result<TransferId, ClientError> {
        let resp = self
            .ws
            .send_request::<()>(MessageType::InitUpload, None)
            .await?;
        let body: InitUploadResponse = expect_payload(resp, MessageType::InitUploadResponse)?;
        body.transfer_id
            .parse()
            .map_err(|e| ClientError::InvalidResponse(format!("transfer id: {e}")))
    }

    /// Offers `chunk` for transfer `id`.
    pub async fn upload_chunk(&self, id: &TransferId, chunk: &Chunk) -> Result<(), ClientError> {
        let req = UploadChunkRequest {
            transfer_id: id.to_string(),
            chunk_number: wire_number(chunk.number)?,
            data: chunk.data.clone(),
            is_last: chunk.is_last,
        };
        let resp = self
            .ws
            .send_request(MessageType::UploadChunk, Some(&req))
            .await?;
        expect_type(&resp, MessageType::UploadChunkResponse)
    }

    /// Fetches pending chunk `number` of transfer `id` without consuming it.
    pub async fn download_chunk(&self, id: &TransferId, number: u64) -> Result<Chunk, ClientError> {
        let req = DownloadChunkRequest {
            transfer_id: id.to_string(),
            chunk_number: wire_number(number)?,
        };
        let resp = self
            .ws
            .send_request(MessageType::DownloadChunk, Some(&req))
            .await?;
        let body: DownloadChunkResponse = expect_payload(resp, MessageType::DownloadChunkResponse)?;

        if body.chunk_number != req.chunk_number {
            return Err(ClientError::InvalidResponse(format!(
                "asked for chunk {number}, got {}",
                body.chunk_number
            )));
        }
        Ok(Chunk::new(number, body.data, body.is_last))
    }

    /// Releases chunk `number` of transfer `id` on the server.
    pub async fn confirm_chunk_downloaded(
        &self,
        id: &TransferId,
        number: u64,
    ) -> Result<(), ClientError> {
        let req = ConfirmChunkDownloadedRequest {
            transfer_id: id.to_string(),
            chunk_number: wire_number(number)?,
        };
        let resp = self
            .ws
            .send_request(MessageType::ConfirmChunkDownloaded, Some(&req))
            .await?;
        expect_type(&resp, MessageType::ConfirmChunkDownloadedResponse)
    }

    /// Number of the chunk currently pending in transfer `id`.
    pub async fn current_segment_number(&self, id: &TransferId) -> Result<u64, ClientError> {
        let req = GetCurrentSegmentNumberRequest {
            transfer_id: id.to_string(),
        };
        let resp = self
            .ws
            .send_request(MessageType::GetCurrentSegmentNumber, Some(&req))
            .await?;
        let body: CurrentSegmentNumberResponse =
            expect_payload(resp, MessageType::CurrentSegmentNumberResponse)?;
        local_number(body.chunk_number)
    }

    /// Diagnostic snapshot of transfer `id`.
    pub async fn transfer_status(&self, id: &TransferId) -> Result<SessionSnapshot, ClientError> {
        let req = GetTransferStatusRequest {
            transfer_id: id.to_string(),
        };
        let resp = self
            .ws
            .send_request(MessageType::GetTransferStatus, Some(&req))
            .await?;
        let body: TransferStatusResponse =
            expect_payload(resp, MessageType::TransferStatusResponse)?;

        Ok(SessionSnapshot {
            pending_chunk_number: body.pending_chunk_number.map(local_number).transpose()?,
            last_consumed_number: body.last_consumed_number.map(local_number).transpose()?,
            uploaded_chunks: body.uploaded_chunks,
            uploaded_bytes: body.uploaded_bytes,
        })
    }

    pub async fn close(&self) {
        self.ws.close().await;
    }
}

fn expect_type(resp: &Message, expected: MessageType) -> Result<(), ClientError> {
    if resp.msg_type != expected {
        return Err(ClientError::InvalidResponse(format!(
            "expected {expected:?}, got {:?}",
            resp.msg_type
        )));
    }
    Ok(())
}

fn expect_payload<T: DeserializeOwned>(
    resp: Message,
    expected: MessageType,
) -> Result<T, ClientError> {
    expect_type(&resp, expected)?;
    resp.parse_payload()?
        .ok_or_else(|| ClientError::InvalidResponse("missing payload".into()))
}

fn wire_number(number: u64) -> Result<i64, ClientError> {
    i64::try_from(number)
        .map_err(|_| ClientError::InvalidResponse(format!("chunk number {number} out of range")))
}

fn local_number(number: i64) -> Result<u64, ClientError> {
    u64::try_from(number)
        .map_err(|_| ClientError::InvalidResponse(format!("negative chunk number {number}")))
}
