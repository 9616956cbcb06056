use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mailinglist_store::Database;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::client::{self, ClientId, ClientRegistry};
use crate::handlers::{self, HandlerState};
use crate::json_api;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::service::SubscriberService;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub json_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    /// Deadline for each storage call made on behalf of a request.
    pub request_timeout: Duration,
    /// Outbound frames buffered per WebSocket before responses are dropped.
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            json_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            rpc_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            request_timeout: Duration::from_secs(5),
            max_send_queue: 256,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{listener} listener task panicked: {detail}")]
    Join {
        listener: &'static str,
        detail: String,
    },
}

/// Shared application state passed to the RPC listener's handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

/// Build the RPC listener's router.
pub fn build_rpc_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rpc", post(rpc_http_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind both listeners and serve them as independent tasks sharing one
/// store. Returns once both sockets are bound.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, ServerError> {
    let service = SubscriberService::new(db, config.request_timeout);
    let shutdown = CancellationToken::new();

    let json_listener = bind(config.json_addr).await?;
    let rpc_listener = bind(config.rpc_addr).await?;
    let json_addr = local_addr(&json_listener, config.json_addr)?;
    let rpc_addr = local_addr(&rpc_listener, config.rpc_addr)?;

    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let cleanup = client::start_cleanup_task(
        Arc::clone(&client_registry),
        Duration::from_secs(60),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let handler_state = Arc::new(HandlerState::new(service.clone()));
    let processor = tokio::spawn(process_rpc_messages(
        msg_rx,
        Arc::clone(&handler_state),
        Arc::clone(&client_registry),
    ));

    let app_state = AppState {
        handler_state,
        client_registry,
        message_tx: msg_tx,
    };

    tracing::info!(addr = %json_addr, "JSON API listening");
    let json = tokio::spawn(serve(
        json_listener,
        json_api::router(service),
        shutdown.clone(),
    ));

    tracing::info!(addr = %rpc_addr, "RPC API listening");
    let rpc = tokio::spawn(serve(
        rpc_listener,
        build_rpc_router(app_state),
        shutdown.clone(),
    ));

    Ok(ServerHandle {
        json_addr,
        rpc_addr,
        shutdown,
        json,
        rpc,
        processor,
        cleanup,
    })
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: SocketAddr) -> Result<SocketAddr, ServerError> {
    listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })
}

async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Handle returned by `start()`. Both listeners run until `shutdown` is
/// called (or one of them fails); `join` waits for them.
pub struct ServerHandle {
    pub json_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    shutdown: CancellationToken,
    json: JoinHandle<std::io::Result<()>>,
    rpc: JoinHandle<std::io::Result<()>>,
    processor: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl ServerHandle {
    /// Ask both listeners to stop accepting and drain.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for both listeners to finish. If either one stops on its own,
    /// the other is told to shut down too.
    pub async fn join(self) -> Result<(), ServerError> {
        let Self {
            shutdown,
            json,
            rpc,
            processor,
            cleanup,
            ..
        } = self;

        let json = watch_listener("json", json, shutdown.clone());
        let rpc = watch_listener("rpc", rpc, shutdown.clone());
        let (json_result, rpc_result) = tokio::join!(json, rpc);

        processor.abort();
        cleanup.abort();

        json_result.and(rpc_result)
    }

    /// Serve until `signal` resolves or a listener stops, then drain both.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let trigger = tokio::spawn(async move {
            tokio::select! {
                _ = signal => {
                    tracing::info!("shutdown requested");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });
        let result = self.join().await;
        trigger.abort();
        result
    }
}

async fn watch_listener(
    listener: &'static str,
    task: JoinHandle<std::io::Result<()>>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let result = match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ServerError::Serve { listener, source }),
        Err(e) => Err(ServerError::Join {
            listener,
            detail: e.to_string(),
        }),
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "listener stopped");
    }
    shutdown.cancel();
    result
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
    )
    .await;
}

/// Single request/response RPC over plain HTTP.
async fn rpc_http_handler(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Json<RpcResponse> {
    let response = match body {
        Ok(Json(request)) => handlers::handle_request(&state.handler_state, request).await,
        Err(JsonRejection::JsonSyntaxError(_)) => RpcResponse::parse_error(),
        Err(rejection) => RpcResponse::invalid_request(rejection.body_text()),
    };
    Json(response)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = handlers::dispatch(
        &state.handler_state,
        "system.ping",
        &serde_json::json!({}),
        None,
    )
    .await;

    let http_status = if resp.success {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(resp.result.unwrap_or_default()))
}

/// Process incoming WebSocket frames. Each request runs as its own task so
/// one slow call does not hold up the rest; responses carry the request id.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw_message)) = rx.recv().await {
        let state = Arc::clone(&state);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let response = handlers::handle_message(&state, &raw_message).await;
            match serde_json::to_string(&response) {
                Ok(json) => {
                    registry.send_to(&client_id, json);
                }
                Err(e) => tracing::error!(error = %e, "failed to encode RPC response"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            json_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health_on_both_listeners() {
        let handle = start(local_config(), Database::in_memory().unwrap())
            .await
            .unwrap();
        assert!(handle.json_addr.port() > 0);
        assert!(handle.rpc_addr.port() > 0);
        assert_ne!(handle.json_addr, handle.rpc_addr);

        for addr in [handle.json_addr, handle.rpc_addr] {
            let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
            assert_eq!(resp.status(), 200);
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["status"], "healthy");
        }

        handle.shutdown();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            rpc_addr: taken.local_addr().unwrap(),
            ..local_config()
        };
        let err = start(config, Database::in_memory().unwrap())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn run_until_stops_when_signal_fires() {
        let handle = start(local_config(), Database::in_memory().unwrap())
            .await
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(handle.run_until(async move {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn default_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.json_addr.port(), 8000);
        assert_eq!(config.rpc_addr.port(), 8001);
    }
}
