//! REST control surface for the bridge.

mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use crate::manager::BridgeManager;

/// Path the gateway POSTs inbound messages to once the webhook is set up.
pub const WEBHOOK_PATH: &str = "/webhook/whatsapp";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BridgeManager>,
}

/// Build the router for every bridge endpoint.
pub fn bridge_routes(manager: Arc<BridgeManager>) -> Router {
    let state = AppState { manager };

    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/clients", get(routes::list_clients))
        .route("/clients/{id}", get(routes::client_detail))
        .route("/send-message", post(routes::send_message))
        .route("/send-bulk", post(routes::send_bulk))
        .route("/tasks/current", get(routes::current_task))
        .route("/tasks/cancel", post(routes::cancel_task))
        .route("/tasks/{id}", get(routes::task_result))
        .route("/auto-reply", post(routes::set_auto_reply))
        .route("/bulk-delay", post(routes::set_bulk_delay))
        .route("/partitions", get(routes::list_partitions))
        .route("/partitions/active", post(routes::switch_partition))
        .route("/reconcile", post(routes::reconcile))
        .route("/inbox/poll", post(routes::poll_inbox))
        .route(WEBHOOK_PATH, post(routes::webhook))
        .route("/webhook/setup", post(routes::setup_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
