//! Request handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{AppState, WEBHOOK_PATH};
use crate::error::{Error, StoreError, TaskError};
use crate::inbox::{InboundMessage, Intake};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"success": false, "error": message.into()}))).into_response()
}

// ── Health & status ─────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "roster-bridge"
    }))
}

pub(super) async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let manager = &state.manager;
    let gateway = match manager.check_status().await {
        Ok(s) => json!({"ready": s.ready, "error": s.error}),
        Err(e) => json!({"ready": false, "error": e.to_string()}),
    };
    let settings = manager.settings().await;

    Json(json!({
        "gateway": gateway,
        "task": manager.task_status(),
        "auto_reply": {
            "enabled": settings.auto_reply_enabled,
            "message": settings.auto_reply_message,
        },
        "bulk_delay_secs": settings.bulk_delay.as_secs(),
        "active_partition": manager.active_partition().await,
        "webhook": manager.webhook_stats(),
    }))
}

// ── Clients ─────────────────────────────────────────────────────────────

pub(super) async fn list_clients(State(state): State<AppState>) -> Response {
    match state.manager.clients_with_history().await {
        Ok(ids) => Json(json!({"clients": ids})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(super) async fn client_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.client_history(&id).await {
        Ok(history) if history.contact.is_none() && history.messages.is_empty() => {
            error_response(StatusCode::NOT_FOUND, "Client not found")
        }
        Ok(history) => Json(history).into_response(),
        Err(StoreError::InvalidId(_)) => error_response(StatusCode::BAD_REQUEST, "Invalid client id"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Sending ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct SendMessageRequest {
    phone: String,
    message: String,
    #[serde(default, alias = "sa")]
    id: Option<String>,
}

pub(super) async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    if body.phone.trim().is_empty() || body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "phone and message are required");
    }
    let outcome = state
        .manager
        .send_single(&body.phone, &body.message, body.id.as_deref())
        .await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(outcome)).into_response()
}

#[derive(Deserialize)]
pub(super) struct SendBulkRequest {
    message: String,
    #[serde(default, alias = "sa_list")]
    ids: Option<Vec<String>>,
    #[serde(default = "default_dedupe")]
    dedupe: bool,
}

fn default_dedupe() -> bool {
    true
}

pub(super) async fn send_bulk(
    State(state): State<AppState>,
    Json(body): Json<SendBulkRequest>,
) -> Response {
    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }
    match state
        .manager
        .submit_bulk_send(body.ids, &body.message, None, body.dedupe)
    {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(json!({"success": true, "task_id": task_id})),
        )
            .into_response(),
        Err(TaskError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, TaskError::AlreadyRunning.to_string())
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

// ── Tasks ───────────────────────────────────────────────────────────────

pub(super) async fn current_task(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.task_status())
}

pub(super) async fn task_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if let Some(result) = state.manager.poll_task(&id) {
        return Json(result).into_response();
    }
    let status = state.manager.task_status();
    if status.current_task_id.as_deref() == Some(id.as_str()) {
        return (
            StatusCode::ACCEPTED,
            Json(json!({"task_id": id, "status": "running", "progress": status.progress})),
        )
            .into_response();
    }
    error_response(StatusCode::NOT_FOUND, "Unknown or expired task")
}

pub(super) async fn cancel_task(State(state): State<AppState>) -> Response {
    match state.manager.cancel_task() {
        Ok(task_id) => {
            info!(task_id = %task_id, "Cancel requested over HTTP");
            Json(json!({"success": true, "task_id": task_id, "status": "cancelling"})).into_response()
        }
        Err(e) => error_response(StatusCode::CONFLICT, e.to_string()),
    }
}

// ── Settings ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct AutoReplyRequest {
    enabled: bool,
    #[serde(default)]
    message: Option<String>,
}

pub(super) async fn set_auto_reply(
    State(state): State<AppState>,
    Json(body): Json<AutoReplyRequest>,
) -> impl IntoResponse {
    state.manager.set_auto_reply(body.enabled, body.message).await;
    let settings = state.manager.settings().await;
    Json(json!({
        "enabled": settings.auto_reply_enabled,
        "message": settings.auto_reply_message,
    }))
}

#[derive(Deserialize)]
pub(super) struct BulkDelayRequest {
    seconds: u64,
}

pub(super) async fn set_bulk_delay(
    State(state): State<AppState>,
    Json(body): Json<BulkDelayRequest>,
) -> impl IntoResponse {
    let applied = state.manager.set_bulk_delay_seconds(body.seconds).await;
    Json(json!({"bulk_delay_secs": applied.as_secs()}))
}

// ── Partitions ──────────────────────────────────────────────────────────

pub(super) async fn list_partitions(State(state): State<AppState>) -> Response {
    match state.manager.list_partitions().await {
        Ok(partitions) => Json(json!({
            "partitions": partitions,
            "active": state.manager.active_partition().await,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub(super) struct SwitchPartitionRequest {
    name: String,
}

pub(super) async fn switch_partition(
    State(state): State<AppState>,
    Json(body): Json<SwitchPartitionRequest>,
) -> Response {
    match state.manager.switch_partition(&body.name).await {
        Ok(true) => Json(json!({"success": true, "active": body.name})).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("Unknown partition: {}", body.name)),
        Err(e) => {
            warn!(partition = %body.name, error = %e, "Partition switch failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ── Background work ─────────────────────────────────────────────────────

pub(super) async fn reconcile(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.reconcile_now().await)
}

pub(super) async fn poll_inbox(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.poll_inbox_now().await)
}

// ── Webhook ─────────────────────────────────────────────────────────────

pub(super) async fn webhook(
    State(state): State<AppState>,
    Json(msg): Json<InboundMessage>,
) -> Response {
    match state.manager.receive_webhook(&msg).await {
        Ok(None) => Json(json!({"success": true, "ignored": true})).into_response(),
        Ok(Some(Intake::NoSender)) => {
            error_response(StatusCode::BAD_REQUEST, "contactNumber is required")
        }
        Ok(Some(Intake::Unmatched)) => Json(json!({"success": true, "matched": false})).into_response(),
        Ok(Some(Intake::Logged(contact))) => {
            Json(json!({"success": true, "matched": true, "sa": contact.id})).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Webhook message not logged");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub(super) async fn setup_webhook(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "Host header is required");
    };
    let url = format!("http://{host}{WEBHOOK_PATH}");

    match state.manager.register_webhook(&url).await {
        Ok(outcome) if outcome.success => {
            Json(json!({"success": true, "url": url, "message": outcome.message})).into_response()
        }
        Ok(outcome) => (StatusCode::BAD_GATEWAY, Json(outcome)).into_response(),
        Err(Error::Gateway(e)) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
