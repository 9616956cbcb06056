//! WebSocket client bookkeeping for the RPC listener: one entry per open
//! socket, heartbeat pings, and reaping of sockets that stop answering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client.
pub struct Client {
    pub id: ClientId,
    tx: mpsc::Sender<String>,
    last_pong: AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID + outbound queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients
            .insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        (id, rx)
    }

    pub fn unregister(&self, id: &ClientId) {
        self.clients.remove(id);
    }

    fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Queue a message for one client. Returns false if the client is gone
    /// or its queue is full; a full queue drops the message.
    pub fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        let Some(client) = self.get(client_id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %client_id,
                    msg_len = msg.len(),
                    "Send queue full, dropping response"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn record_pong(&self, client_id: &ClientId) {
        if let Some(client) = self.get(client_id) {
            client.record_pong();
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that haven't responded to pings within the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        for id in &dead {
            self.unregister(id);
            tracing::info!(client_id = %id, "Cleaned up dead client");
        }
        dead.len()
    }
}

/// Drive one WebSocket: a writer task drains the client's queue and sends
/// heartbeat pings, a reader task forwards text frames to `on_message`.
/// When either side stops the other is aborted, so a client removed from the
/// registry gets a Close frame and no further frames are read from it.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else {
                        // Unregistered (reaped or shutting down): tell the peer.
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "Sent ping");
                }
            }
        }
    });

    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    if on_message
                        .send((reader_cid.clone(), text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                WsMessage::Pong(_) => reader_registry.record_pong(&reader_cid),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&client_id);
    tracing::info!(client_id = %client_id, "WebSocket client disconnected");
}

/// Start a background task that periodically cleans up dead clients.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed, "Dead client cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("client_"));
    }

    #[test]
    fn registry_register_and_unregister() {
        let registry = ClientRegistry::new(32);
        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&id1);
        assert_eq!(registry.count(), 1);
        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = ClientRegistry::new(32);
        let (id, mut rx) = registry.register();
        assert!(registry.send_to(&id, "hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_client() {
        let registry = ClientRegistry::new(32);
        assert!(!registry.send_to(&ClientId::new(), "x".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = ClientRegistry::new(2);
        let (id, _rx) = registry.register();
        assert!(registry.send_to(&id, "msg1".into()));
        assert!(registry.send_to(&id, "msg2".into()));
        assert!(!registry.send_to(&id, "msg3".into()));
    }

    #[test]
    fn send_to_closed_receiver_fails() {
        let registry = ClientRegistry::new(2);
        let (id, rx) = registry.register();
        drop(rx);
        assert!(!registry.send_to(&id, "late".into()));
    }

    #[test]
    fn cleanup_dead_clients_removes_expired() {
        let registry = ClientRegistry::new(32);
        let (stale, _rx1) = registry.register();
        let (_fresh, _rx2) = registry.register();

        registry
            .get(&stale)
            .unwrap()
            .last_pong
            .store(0, Ordering::Relaxed);

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&stale).is_none());
    }

    #[tokio::test]
    async fn reaped_client_socket_is_closed() {
        use axum::extract::ws::WebSocketUpgrade;
        use axum::extract::State;
        use tokio_tungstenite::tungstenite::Message as PeerMessage;

        type Inbox = mpsc::Sender<(ClientId, String)>;

        let registry = Arc::new(ClientRegistry::new(8));
        let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, String)>(8);

        let app = axum::Router::new()
            .route(
                "/ws",
                axum::routing::get(
                    |ws: WebSocketUpgrade,
                     State((registry, inbox)): State<(Arc<ClientRegistry>, Inbox)>| async move {
                        ws.on_upgrade(move |socket| async move {
                            let (id, rx) = registry.register();
                            handle_ws_connection(socket, id, rx, registry, inbox).await;
                        })
                    },
                ),
            )
            .with_state((Arc::clone(&registry), msg_tx));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut peer, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        peer.send(PeerMessage::Text("before-reap".into())).await.unwrap();
        let (_, text) = tokio::time::timeout(Duration::from_secs(2), msg_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "before-reap");

        for client in registry.clients.iter() {
            client.value().last_pong.store(0, Ordering::Relaxed);
        }
        assert_eq!(registry.cleanup_dead_clients(), 1);

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match peer.next().await {
                    Some(Ok(PeerMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "peer never saw the socket close");

        let _ = peer.send(PeerMessage::Text("after-reap".into())).await;
        let forwarded = tokio::time::timeout(Duration::from_millis(200), msg_rx.recv()).await;
        assert!(!matches!(forwarded, Ok(Some(_))), "frame read after reap");
    }

    #[test]
    fn pong_keeps_client_alive() {
        let registry = ClientRegistry::new(32);
        let (id, _rx) = registry.register();
        let client = registry.get(&id).unwrap();
        client.last_pong.store(0, Ordering::Relaxed);
        assert!(!client.is_alive());

        registry.record_pong(&id);
        assert!(client.is_alive());
    }
}
