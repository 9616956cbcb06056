//! RPC method handlers.

use mailinglist_core::SubscriberEntry;
use mailinglist_store::StoreError;
use serde_json::json;
use tracing::{error, info};

use crate::rpc::{self, RpcRequest, RpcResponse};
use crate::service::{ServiceError, SubscriberService};

const EMAIL_KEYS: &[&str] = &["email", "email_addr", "emailAddr"];
const PAGE_KEYS: &[&str] = &["page"];
const COUNT_KEYS: &[&str] = &["count", "pageSize", "page_size"];

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub service: SubscriberService,
}

impl HandlerState {
    pub fn new(service: SubscriberService) -> Self {
        Self { service }
    }
}

/// Run one decoded request.
pub async fn handle_request(state: &HandlerState, request: RpcRequest) -> RpcResponse {
    let params = request.params.unwrap_or_else(|| json!({}));
    if !params.is_object() {
        return RpcResponse::invalid_params(request.id, "params must be an object");
    }
    dispatch(state, &request.method, &params, request.id).await
}

/// Decode a raw text frame and run it. Undecodable input gets a parse error.
pub async fn handle_message(state: &HandlerState, raw: &str) -> RpcResponse {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Err(_) => RpcResponse::parse_error(),
        Ok(value) => match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => handle_request(state, request).await,
            Err(e) => RpcResponse::invalid_request(e.to_string()),
        },
    }
}

/// Dispatch an RPC method to the appropriate handler. The `CamelCase`
/// aliases are the service's original method names.
pub async fn dispatch(
    state: &HandlerState,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "email.create" | "CreateEmail" => email_create(state, params, id).await,
        "email.get" | "GetEmail" => email_get(state, params, id).await,
        "email.getBatch" | "GetEmailBatch" => email_get_batch(state, params, id).await,
        "email.update" | "UpdateEmail" => email_update(state, params, id).await,
        "email.delete" | "DeleteEmail" => email_delete(state, params, id).await,

        "system.ping" | "health" => health(state, id).await,

        _ => RpcResponse::method_not_found(id, method),
    }
}

// ── Email handlers ──

async fn email_create(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let email = match rpc::require_str(params, EMAIL_KEYS) {
        Ok(e) => e,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    info!(email, "RPC email.create");
    match state.service.create(email).await {
        Ok(entry) => RpcResponse::success(id, json!({ "entry": entry })),
        Err(e) => service_error(id, "email.create", e),
    }
}

async fn email_get(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let email = match rpc::require_str(params, EMAIL_KEYS) {
        Ok(e) => e,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    info!(email, "RPC email.get");
    match state.service.get(email).await {
        Ok(entry) => RpcResponse::success(id, json!({ "entry": entry })),
        Err(e) => service_error(id, "email.get", e),
    }
}

async fn email_get_batch(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let page = rpc::optional_i64(params, PAGE_KEYS).unwrap_or(0);
    let count = rpc::optional_i64(params, COUNT_KEYS).unwrap_or(0);

    info!(page, count, "RPC email.getBatch");
    match state.service.list_page(page, count).await {
        Ok(entries) => RpcResponse::success(id, json!({ "entries": entries })),
        Err(e) => service_error(id, "email.getBatch", e),
    }
}

async fn email_update(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(raw) = params.get("entry") else {
        return RpcResponse::invalid_params(id, "Missing required parameter: entry");
    };
    let entry: SubscriberEntry = match serde_json::from_value(raw.clone()) {
        Ok(entry) => entry,
        Err(e) => return RpcResponse::invalid_params(id, format!("invalid entry: {e}")),
    };

    info!(email = %entry.email, "RPC email.update");
    match state.service.upsert(entry).await {
        Ok(entry) => RpcResponse::success(id, json!({ "entry": entry })),
        Err(e) => service_error(id, "email.update", e),
    }
}

async fn email_delete(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let email = match rpc::require_str(params, EMAIL_KEYS) {
        Ok(e) => e,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    info!(email, "RPC email.delete");
    if let Err(e) = state.service.soft_delete(email).await {
        return service_error(id, "email.delete", e);
    }
    match state.service.get(email).await {
        Ok(entry) => RpcResponse::success(id, json!({ "entry": entry })),
        Err(e) => service_error(id, "email.delete", e),
    }
}

// ── System ──

async fn health(state: &HandlerState, id: Option<serde_json::Value>) -> RpcResponse {
    match state.service.count_active().await {
        Ok(active) => RpcResponse::success(
            id,
            json!({ "status": "healthy", "activeSubscribers": active }),
        ),
        Err(e) => service_error(id, "system.ping", e),
    }
}

/// Map a service failure onto the wire. Client-class errors are returned
/// as-is; server-class errors are logged first.
fn service_error(id: Option<serde_json::Value>, method: &str, err: ServiceError) -> RpcResponse {
    match &err {
        ServiceError::InvalidArgument(_) => RpcResponse::invalid_params(id, err.to_string()),
        ServiceError::Store(StoreError::DuplicateEmail(_)) => {
            RpcResponse::error(id, rpc::DUPLICATE_EMAIL, err.to_string())
        }
        ServiceError::Timeout(_) => {
            error!(method, error = %err, "RPC request timed out");
            RpcResponse::error(id, rpc::TIMEOUT, err.to_string())
        }
        ServiceError::Store(_) | ServiceError::Internal(_) => {
            error!(method, error = %err, "RPC request failed");
            RpcResponse::internal_error(id, err.to_string())
        }
    }
}
