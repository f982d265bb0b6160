//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use transferit_protocol::constants::{
    MessageType, WS_ERR_CODE_NOT_IMPLEMENTED, WS_PING_PERIOD, WS_PONG_WAIT,
};
use transferit_protocol::envelope::Message;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;

/// Handle for sending messages to one connected client.
///
/// Cloneable; wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` only if the buffer is full or the client disconnected.
    pub fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Sends an error response for the given request message.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message))
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Detached sender plus the receiving end, for driving handlers in tests.
    #[cfg(test)]
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Runs the read and write pumps for a WebSocket connection.
///
/// The pumps run as background tokio tasks and stop when the connection
/// closes or `server_cancel` fires. `on_closed` runs once after the read
/// pump has exited and the handler's disconnect hook completed.
///
/// Inbound message size is bounded by the WebSocket config of `ws_stream`;
/// an oversize message ends the read pump with an error.
pub(crate) fn spawn_connection<S, H, F>(
    ws_stream: S,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    server_cancel: CancellationToken,
    on_closed: F,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender { tx };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    let read_cancel = cancel;
    tokio::spawn(async move {
        read_pump(ws_stream, sender, Arc::clone(&handler), read_cancel.clone()).await;
        // When the read pump exits, stop the write pump too.
        read_cancel.cancel();
        handler.on_disconnected().await;
        on_closed();
        tracing::info!(%peer_addr, "client disconnected");
    });
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches requests to the handler.
///
/// Any inbound frame counts as liveness; the connection is dropped after
/// a full [`WS_PONG_WAIT`] period of silence.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut deadline = tokio::time::interval(WS_PONG_WAIT);
    deadline.reset();
    let mut alive = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = deadline.tick() => {
                if !alive {
                    tracing::warn!("pong timeout, closing connection");
                    break;
                }
                alive = false;
            }

            frame = stream.next() => {
                alive = true;
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch_text(&handler, &sender, &text).await;
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        tracing::warn!("binary frames are not part of the protocol, ignoring");
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        deadline.reset();
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.tx.try_send(WsMessage::Pong(data));
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::debug!("received close frame");
                        break;
                    }
                    Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the matching handler method.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("invalid message JSON: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::Ping => handler.on_ping(s, msg).await,
        MessageType::InitUpload => handler.on_init_upload(s, msg).await,
        MessageType::UploadChunk => handler.on_upload_chunk(s, msg).await,
        MessageType::DownloadChunk => handler.on_download_chunk(s, msg).await,
        MessageType::ConfirmChunkDownloaded => handler.on_confirm_chunk_downloaded(s, msg).await,
        MessageType::GetCurrentSegmentNumber => {
            handler.on_get_current_segment_number(s, msg).await
        }
        MessageType::GetTransferStatus => handler.on_get_transfer_status(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "unknown message type");
        }
    }
}
