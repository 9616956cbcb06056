//! JSON-RPC client for the mailing-list server's WebSocket endpoint.
//!
//! Every call is bounded by a deadline; a call that misses it fails with
//! [`ClientError::Timeout`] and is not retried.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mailinglist_core::SubscriberEntry;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("call exceeded {0:?}")]
    Timeout(Duration),

    #[error("server error {code}: {message}")]
    Rpc { code: String, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

impl ClientError {
    /// The server's symbolic error code, if the server answered with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rpc { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: Option<Value>,
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    code: String,
    message: String,
}

impl Reply {
    fn into_result(self) -> Result<Value, ClientError> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let err = self.error.unwrap_or(ReplyError {
            code: "UNKNOWN_ERROR".into(),
            message: "error response without details".into(),
        });
        Err(ClientError::Rpc {
            code: err.code,
            message: err.message,
        })
    }
}

pub struct RpcClient {
    ws: WsStream,
    next_id: u64,
    timeout: Duration,
}

impl RpcClient {
    /// Connect to `ws://host:port/ws`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let (ws, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;
        Ok(Self {
            ws,
            next_id: 1,
            timeout,
        })
    }

    /// Issue one call and wait for the response with the matching id.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({ "id": id, "method": method, "params": params });
        let deadline = self.timeout;
        tokio::time::timeout(deadline, async {
            self.ws.send(Message::Text(request.to_string().into())).await?;
            self.read_reply(id).await
        })
        .await
        .map_err(|_| ClientError::Timeout(deadline))?
    }

    async fn read_reply(&mut self, id: u64) -> Result<Value, ClientError> {
        let expected = json!(id);
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => {
                    let reply: Reply = serde_json::from_str(text.as_str())?;
                    // Replies to calls that already timed out are skipped
                    if reply.id.as_ref() == Some(&expected) {
                        return reply.into_result();
                    }
                    tracing::debug!(id = ?reply.id, "skipping stale reply");
                }
                Message::Close(_) => return Err(ClientError::Closed),
                _ => {}
            }
        }
        Err(ClientError::Closed)
    }

    pub async fn create_email(&mut self, email: &str) -> Result<SubscriberEntry, ClientError> {
        let result = self.call("email.create", json!({ "email": email })).await?;
        entry_field(result)?.ok_or(ClientError::Rpc {
            code: "INTERNAL_ERROR".into(),
            message: "create returned no entry".into(),
        })
    }

    pub async fn get_email(&mut self, email: &str) -> Result<Option<SubscriberEntry>, ClientError> {
        let result = self.call("email.get", json!({ "email": email })).await?;
        entry_field(result)
    }

    pub async fn get_email_batch(
        &mut self,
        page: i64,
        count: i64,
    ) -> Result<Vec<SubscriberEntry>, ClientError> {
        let mut result = self
            .call("email.getBatch", json!({ "page": page, "count": count }))
            .await?;
        Ok(serde_json::from_value(result["entries"].take())?)
    }

    pub async fn update_email(
        &mut self,
        entry: &SubscriberEntry,
    ) -> Result<Option<SubscriberEntry>, ClientError> {
        let result = self.call("email.update", json!({ "entry": entry })).await?;
        entry_field(result)
    }

    pub async fn delete_email(
        &mut self,
        email: &str,
    ) -> Result<Option<SubscriberEntry>, ClientError> {
        let result = self.call("email.delete", json!({ "email": email })).await?;
        entry_field(result)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}

fn entry_field(mut result: Value) -> Result<Option<SubscriberEntry>, ClientError> {
    Ok(serde_json::from_value(result["entry"].take())?)
}
