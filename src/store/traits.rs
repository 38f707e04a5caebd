//! `ConversationStore` trait: single async interface for conversation logs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Direction of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the bridge to the client.
    Sent,
    /// Received from the client.
    Received,
}

/// One entry of a client's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "type")]
    pub direction: Direction,
    /// ISO-8601 timestamp as written (not validated on read).
    pub timestamp: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default)]
    pub phone: String,
}

impl MessageRecord {
    /// Parsed timestamp, or `None` when it is not valid ISO-8601.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`, `...-03:00`) and naive local
/// timestamps (`2024-05-01T10:00:00.123456`), the latter read in the local
/// timezone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Per-client append-only message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a SENT record. `contact` is stored as the client's info the
    /// first time the client is written.
    async fn append_sent(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        contact: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Append a RECEIVED record. A missing timestamp means "now".
    async fn append_received(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        timestamp: Option<&str>,
    ) -> Result<(), StoreError>;

    /// All records of a client in storage order (not necessarily sorted).
    async fn get_messages(&self, id: &str) -> Result<Vec<MessageRecord>, StoreError>;

    /// Stored client info, empty when unknown.
    async fn get_contact_info(&self, id: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Identifiers of every client with at least one record.
    async fn list_ids_with_history(&self) -> Result<Vec<String>, StoreError>;
}
