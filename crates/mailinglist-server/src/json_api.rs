//! HTTP+JSON adapter.
//!
//! Routes mirror the RPC methods one to one. Wrong verbs are answered with
//! 405 by the router; every error body is `{"error": "..."}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use mailinglist_core::SubscriberEntry;
use mailinglist_store::StoreError;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::service::{ServiceError, SubscriberService};

pub fn router(service: SubscriberService) -> Router {
    Router::new()
        .route("/email/create", post(create_email))
        .route("/email/get", get(get_email))
        .route("/email/get/batch", get(get_email_batch))
        .route("/email/update", put(update_email))
        .route("/email/delete", delete(delete_email))
        .route("/health", get(health))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

/// Error response: status plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::Store(StoreError::DuplicateEmail(_)) => StatusCode::CONFLICT,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Store(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !err.is_client_error() {
            error!(error = %err, "JSON request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default, alias = "pageSize")]
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub page: i64,
    pub count: i64,
    pub entries: Vec<SubscriberEntry>,
}

async fn create_email(
    State(service): State<SubscriberService>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<SubscriberEntry>, ApiError> {
    let Json(req) = body?;
    info!(email = %req.email, "JSON create");
    Ok(Json(service.create(&req.email).await?))
}

async fn get_email(
    State(service): State<SubscriberService>,
    query: Result<Query<EmailRequest>, QueryRejection>,
) -> Result<Json<SubscriberEntry>, ApiError> {
    let Query(req) = query?;
    info!(email = %req.email, "JSON get");
    match service.get(&req.email).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no subscriber for {}", req.email.trim()),
        )),
    }
}

async fn get_email_batch(
    State(service): State<SubscriberService>,
    query: Result<Query<BatchQuery>, QueryRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Query(q) = query?;
    info!(page = q.page, count = q.count, "JSON get batch");
    let entries = service.list_page(q.page, q.count).await?;
    Ok(Json(BatchResponse {
        page: q.page,
        count: q.count,
        entries,
    }))
}

async fn update_email(
    State(service): State<SubscriberService>,
    body: Result<Json<SubscriberEntry>, JsonRejection>,
) -> Result<Json<SubscriberEntry>, ApiError> {
    let Json(entry) = body?;
    info!(email = %entry.email, opt_out = entry.opt_out, "JSON update");
    Ok(Json(service.upsert(entry).await?))
}

async fn delete_email(
    State(service): State<SubscriberService>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<Option<SubscriberEntry>>, ApiError> {
    let Json(req) = body?;
    info!(email = %req.email, "JSON delete");
    service.soft_delete(&req.email).await?;
    Ok(Json(service.get(&req.email).await?))
}

async fn health(State(service): State<SubscriberService>) -> Response {
    match service.count_active().await {
        Ok(active) => Json(serde_json::json!({
            "status": "healthy",
            "activeSubscribers": active,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unhealthy", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
