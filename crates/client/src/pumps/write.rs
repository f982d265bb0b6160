//! WebSocket write pump: drains the outbound channel into the socket.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub(crate) async fn write_pump<S>(
    mut write: S,
    mut rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let is_close = matches!(msg, tungstenite::Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    warn!("WebSocket write error: {e}");
                    break;
                }
                if is_close {
                    break;
                }
            }
        }
    }

    let _ = write.close().await;
}
