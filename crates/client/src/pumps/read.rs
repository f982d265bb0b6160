//! WebSocket read pump: routes responses to waiting requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use transferit_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use transferit_protocol::envelope::Message;

use crate::ws_client::PendingMap;

/// Reads messages from the WebSocket and completes pending requests.
///
/// Any incoming frame resets the liveness deadline; if nothing arrives
/// within [`WS_PONG_WAIT`] the connection is considered dead. On exit all
/// pending requests are dropped so their callers see a closed connection.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("pong timeout, connection dead");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    pending.lock().await.clear();
}

async fn handle_text_message(text: &str, pending: &PendingMap) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");

    match pending.lock().await.remove(&msg.id) {
        Some(tx) => {
            let _ = tx.send(msg);
        }
        None => {
            warn!(msg_type = ?msg.msg_type, id = %msg.id, "response for unknown request, dropping");
        }
    }
}
