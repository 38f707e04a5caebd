use chrono::DateTime;
use serde::Deserialize;

use crate::store::parse_timestamp;

/// The bot writes `message.timestamp` as epoch seconds; hand-written files
/// and older bots use ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(i64),
    EpochFloat(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawTimestamp {
    /// Normalize to RFC 3339. `None` when the value cannot be read as a time.
    pub fn to_iso(&self) -> Option<String> {
        match self {
            Self::Epoch(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.to_rfc3339()),
            Self::EpochFloat(secs) if secs.is_finite() => {
                DateTime::from_timestamp(secs.trunc() as i64, 0).map(|dt| dt.to_rfc3339())
            }
            Self::Text(raw) => parse_timestamp(raw).map(|_| raw.trim().to_string()),
            _ => None,
        }
    }
}

/// One inbound message as written (or posted) by the bot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<String>,
    /// Chat id (`5511...@c.us`). Present on every chat event.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(rename = "contactNumber", default)]
    pub contact_number: String,
    #[serde(rename = "contactName", default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Whether the payload named a sender at all.
    pub fn has_sender(&self) -> bool {
        !self.contact_number.trim().is_empty()
    }

    /// Receive time to log, or `None` to let the store stamp it with now.
    pub fn received_at(&self) -> Option<String> {
        self.timestamp.as_ref().and_then(RawTimestamp::to_iso)
    }
}
