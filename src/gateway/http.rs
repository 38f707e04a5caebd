//! HTTP client for the WhatsApp bot's REST API.
//!
//! - `GET  {base}/api/status`        → `{ "ready": bool, "error": string? }`
//! - `POST {base}/api/send-message`  ← `{ "phone", "message" }`
//!   → `{ "success": bool, "message": string?, "error": string? }`
//! - `POST {base}/api/set-webhook`   ← `{ "url" }` → same shape as send
//!
//! The bot answers refusals (not ready, unregistered number) with a 4xx/5xx
//! status and the same JSON body, so any parseable body is treated as an
//! outcome rather than a transport error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{GatewayStatus, MessageGateway, SendOutcome};
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct WireSendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<WireSendResponse> for SendOutcome {
    fn from(wire: WireSendResponse) -> Self {
        let message = match (wire.message, wire.error) {
            (Some(m), Some(e)) => Some(format!("{m}: {e}")),
            (m, e) => m.or(e),
        };
        Self {
            success: wire.success,
            message,
        }
    }
}

/// Gateway client backed by `reqwest`.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a client for the bot at `base_url`, bounding every request by
    /// `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn post_for_outcome(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<SendOutcome, GatewayError> {
        let resp = self
            .client
            .post(self.api_url(path))
            .json(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        match serde_json::from_str::<WireSendResponse>(&text) {
            Ok(wire) => Ok(SendOutcome::from(wire)),
            Err(_) if !status.is_success() => Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(GatewayError::InvalidResponse(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageGateway for HttpGateway {
    async fn check_status(&self) -> Result<GatewayStatus, GatewayError> {
        let resp = self
            .client
            .get(self.api_url("status"))
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        resp.json::<GatewayStatus>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    async fn send_message(&self, phone: &str, body: &str) -> Result<SendOutcome, GatewayError> {
        let payload = serde_json::json!({
            "phone": phone,
            "message": body,
        });

        let outcome = self.post_for_outcome("send-message", &payload).await?;
        if outcome.success {
            debug!(phone = phone, "Gateway accepted message");
        } else {
            warn!(
                phone = phone,
                reason = outcome.message.as_deref().unwrap_or(""),
                "Gateway refused message"
            );
        }
        Ok(outcome)
    }

    async fn set_webhook(&self, url: &str) -> Result<SendOutcome, GatewayError> {
        let payload = serde_json::json!({ "url": url });
        let outcome = self.post_for_outcome("set-webhook", &payload).await?;
        if !outcome.success {
            warn!(
                url = url,
                reason = outcome.message.as_deref().unwrap_or(""),
                "Gateway rejected webhook"
            );
        }
        Ok(outcome)
    }
}
