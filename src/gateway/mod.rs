//! Message gateway: delivers WhatsApp messages through the local bot.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub use http::HttpGateway;

/// Readiness reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single send as reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SendOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Outbound messaging channel.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Whether the gateway session is connected and able to send.
    async fn check_status(&self) -> Result<GatewayStatus, GatewayError>;

    /// Send `body` to `phone`. `Ok` with `success == false` means the gateway
    /// answered but refused; `Err` means it could not be reached.
    async fn send_message(&self, phone: &str, body: &str) -> Result<SendOutcome, GatewayError>;

    /// Ask the gateway to POST every inbound message to `url`.
    async fn set_webhook(&self, url: &str) -> Result<SendOutcome, GatewayError>;
}
