//! WebSocket ping pump: periodic keepalive pings.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use transferit_protocol::constants::WS_PING_PERIOD;

/// Sends periodic pings so the server's liveness deadline never fires
/// while a transfer is idle (e.g. a downloader waiting on a slow uploader).
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let ping = tungstenite::Message::Ping(vec![].into());
                if write_tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}
