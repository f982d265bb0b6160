//! WebSocket client for transferit servers.
//!
//! Implements the request-response pattern with UUID correlation and
//! ping/pong keepalive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use transferit_protocol::constants::{MessageType, WS_MAX_MESSAGE_SIZE, WS_REQUEST_TIMEOUT};
use transferit_protocol::envelope::Message;

use crate::ClientError;

/// Requests awaiting a response, keyed by envelope id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// WebSocket connection to one server.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Connects to a server WebSocket at `url` (e.g. `ws://127.0.0.1:8083`).
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();
        tracing::debug!(%url, "connected");

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            cancel.clone(),
        ));

        let read_handle = tokio::spawn(crate::pumps::read::read_pump(
            read,
            pending.clone(),
            connected.clone(),
            write_tx.clone(),
            cancel.clone(),
        ));

        let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            write_tx,
            pending,
            connected,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        })
    }

    /// Sends a request and waits for the response.
    ///
    /// An error envelope from the server is returned as
    /// [`ClientError::Server`].
    pub async fn send_request<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Message, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self
            .write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::Closed);
        }

        let result = tokio::time::timeout(WS_REQUEST_TIMEOUT, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => resp.into_result().map_err(ClientError::from),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Returns `false` once the read pump has observed the connection end.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Client whose pumps are replaced by the test; returns the raw
    /// outbound channel.
    fn detached_client() -> (WsClient, mpsc::Receiver<tungstenite::Message>) {
        let (write_tx, write_rx) = mpsc::channel(16);
        let client = WsClient {
            write_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
            cancel: CancellationToken::new(),
        };
        (client, write_rx)
    }

    #[tokio::test]
    async fn send_request_correlates_by_id() {
        let (client, mut write_rx) = detached_client();
        let client = Arc::new(client);
        let pending = client.pending.clone();

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move {
            c.send_request::<()>(MessageType::InitUpload, None).await
        });

        let tungstenite::Message::Text(text) = write_rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let req: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(req.msg_type, MessageType::InitUpload);

        let reply = Message::new(
            &req.id,
            MessageType::InitUploadResponse,
            Some(&serde_json::json!({"transferId": "t"})),
        )
        .unwrap();
        pending
            .lock()
            .await
            .remove(&req.id)
            .unwrap()
            .send(reply)
            .unwrap();

        let resp = call.await.unwrap().unwrap();
        assert_eq!(resp.msg_type, MessageType::InitUploadResponse);
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn error_envelope_becomes_server_error() {
        let (client, mut write_rx) = detached_client();
        let client = Arc::new(client);
        let pending = client.pending.clone();

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move {
            c.send_request::<()>(MessageType::InitUpload, None).await
        });

        let tungstenite::Message::Text(text) = write_rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let req: Message = serde_json::from_str(&text).unwrap();
        let reply = req.reply_error(409, "slot occupied");
        pending
            .lock()
            .await
            .remove(&req.id)
            .unwrap()
            .send(reply)
            .unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Server { code: 409, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn send_request_on_closed_channel() {
        let (client, write_rx) = detached_client();
        drop(write_rx);

        let err = client
            .send_request::<()>(MessageType::Ping, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Closed));
        assert!(client.pending.lock().await.is_empty());
    }
}
