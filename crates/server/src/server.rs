//! Transfer WebSocket server.
//!
//! Listens on a TCP port, upgrades every accepted connection to WebSocket
//! and serves any number of clients concurrently. Uploader and downloader
//! of one transfer are normally two separate connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;
use transferit_protocol::constants::{DEFAULT_PORT, server_message_limit};
use transferit_transfer::DEFAULT_MAX_CHUNK_SIZE;

use crate::ServerError;
use crate::connection;
use crate::handler::Handler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Largest inbound WebSocket message; bigger ones drop the connection.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_message_size: server_message_limit(DEFAULT_MAX_CHUNK_SIZE),
        }
    }
}

/// The transfer WebSocket server.
pub struct TransferServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    connections: Arc<AtomicUsize>,
}

impl<H: Handler> TransferServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of currently open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Gracefully shuts down the server and every open connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("transfer server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades a TCP connection to WS and starts its pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let open = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(%peer_addr, open, "client connected");

        let connections = Arc::clone(&self.connections);
        connection::spawn_connection(
            ws_stream,
            peer_addr,
            Arc::clone(&self.handler),
            self.cancel.clone(),
            move || {
                connections.fetch_sub(1, Ordering::SeqCst);
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use transferit_protocol::MessageType;
    use transferit_protocol::envelope::Message;
    use transferit_protocol::messages::{DownloadChunkResponse, InitUploadResponse};
    use transferit_transfer::{CoordinatorConfig, TransferCoordinator};

    use super::*;
    use crate::service::TransferService;

    /// Handler that answers nothing but pings.
    struct PingOnly;

    impl Handler for PingOnly {}

    fn local_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn start<H: Handler>(
        handler: H,
    ) -> (Arc<TransferServer<H>>, tokio::task::JoinHandle<()>) {
        let server = TransferServer::new(local_config(), handler);
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            server2.run().await.unwrap();
        });

        // Wait for the server to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;
        (server, handle)
    }

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn request(
        ws: &mut Ws,
        id: &str,
        msg_type: MessageType,
        payload: serde_json::Value,
    ) -> Message {
        let payload = (!payload.is_null()).then_some(payload);
        let msg = Message::new(id, msg_type, payload.as_ref()).unwrap();
        ws.send(WsMessage::Text(serde_json::to_string(&msg).unwrap().into()))
            .await
            .unwrap();

        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn unresolvable_host_fails_to_bind() {
        let config = ServerConfig {
            host: "no such host.invalid".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = TransferServer::new(config, PingOnly);
        assert!(matches!(server.run().await, Err(ServerError::Io(_))));
        assert_eq!(server.port().await, 0);
        assert_eq!(ServerConfig::default().port, DEFAULT_PORT);
    }

    #[tokio::test]
    async fn server_binds_dynamic_port() {
        let (server, handle) = start(PingOnly).await;

        let port = server.port().await;
        assert!(port > 0, "should have bound to a dynamic port");
        assert_eq!(server.connection_count(), 0);

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn server_accepts_many_connections() {
        let (server, handle) = start(PingOnly).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);

        let (ws1, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (ws2, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (ws3, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.connection_count(), 3);

        drop(ws1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.connection_count(), 2);

        drop((ws2, ws3));
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn message_limit_follows_config() {
        assert_eq!(
            ServerConfig::default().max_message_size,
            server_message_limit(DEFAULT_MAX_CHUNK_SIZE)
        );

        let config = ServerConfig {
            max_message_size: 64 * 1024,
            ..local_config()
        };
        let server = TransferServer::new(config, PingOnly);
        let s = Arc::clone(&server);
        let handle = tokio::spawn(async move { s.run().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);

        let (mut small, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut big, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let reply = request(&mut small, "p1", MessageType::Ping, serde_json::Value::Null).await;
        assert_eq!(reply.msg_type, MessageType::Pong);

        let huge = serde_json::json!({"id": "b1", "type": "ping", "pad": "x".repeat(128 * 1024)});
        let _ = big.send(WsMessage::Text(huge.to_string().into())).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.connection_count(), 1);

        let reply = request(&mut small, "p2", MessageType::Ping, serde_json::Value::Null).await;
        assert_eq!(reply.id, "p2");

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_type_gets_not_implemented() {
        let (server, handle) = start(PingOnly).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let raw = serde_json::json!({"id": "x1", "type": "login", "payload": {"user": "u"}});
        ws.send(WsMessage::Text(raw.to_string().into())).await.unwrap();
        let reply = loop {
            if let WsMessage::Text(text) = ws.next().await.unwrap().unwrap() {
                break serde_json::from_str::<Message>(&text).unwrap();
            }
        };
        assert_eq!(reply.id, "x1");
        assert_eq!(reply.error.unwrap().code, 501);

        // Handler defaults also answer 501.
        let reply = request(&mut ws, "x2", MessageType::InitUpload, serde_json::Value::Null).await;
        assert_eq!(reply.error.unwrap().code, 501);

        let reply = request(&mut ws, "x3", MessageType::Ping, serde_json::Value::Null).await;
        assert_eq!(reply.msg_type, MessageType::Pong);

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn handoff_between_two_connections() {
        let coordinator = Arc::new(TransferCoordinator::new(CoordinatorConfig::default()));
        let (server, handle) = start(TransferService::new(Arc::clone(&coordinator))).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);

        let (mut uploader, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut downloader, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let reply = request(
            &mut uploader,
            "1",
            MessageType::InitUpload,
            serde_json::Value::Null,
        )
        .await;
        let id = reply
            .parse_payload::<InitUploadResponse>()
            .unwrap()
            .unwrap()
            .transfer_id;

        let reply = request(
            &mut downloader,
            "2",
            MessageType::DownloadChunk,
            serde_json::json!({"transferId": id, "chunkNumber": 0}),
        )
        .await;
        assert_eq!(reply.error.unwrap().code, 425);

        // "abc" in base64, marked last.
        let reply = request(
            &mut uploader,
            "3",
            MessageType::UploadChunk,
            serde_json::json!({"transferId": id, "chunkNumber": 0, "data": "YWJj", "isLast": true}),
        )
        .await;
        assert_eq!(reply.msg_type, MessageType::UploadChunkResponse);

        let reply = request(
            &mut downloader,
            "4",
            MessageType::DownloadChunk,
            serde_json::json!({"transferId": id, "chunkNumber": 0}),
        )
        .await;
        assert_eq!(reply.id, "4");
        let chunk: DownloadChunkResponse = reply.parse_payload().unwrap().unwrap();
        assert_eq!(chunk.data, b"abc");
        assert!(chunk.is_last);

        let reply = request(
            &mut downloader,
            "5",
            MessageType::ConfirmChunkDownloaded,
            serde_json::json!({"transferId": id, "chunkNumber": 0}),
        )
        .await;
        assert_eq!(reply.msg_type, MessageType::ConfirmChunkDownloadedResponse);

        let status = coordinator
            .transfer_status(&id.parse().unwrap())
            .unwrap();
        assert_eq!(status.pending_chunk_number, None);
        assert_eq!(status.last_consumed_number, Some(0));

        server.shutdown();
        handle.await.unwrap();
    }
}
