//! FileConversationStore keeps one JSON document per client.
//!
//! Layout: `<dir>/client_<id>.json`
//!
//! ```json
//! { "client_info": { "SA": "100", "Nome": "Ana" },
//!   "messages": [ { "type": "sent", "timestamp": "...", "message": "...", "phone": "..." } ] }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::traits::{ConversationStore, Direction, MessageRecord};
use crate::error::StoreError;

const FILE_PREFIX: &str = "client_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClientDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_info: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

/// Flat-file conversation store.
///
/// Appends are read-modify-write cycles serialized behind one lock, so
/// concurrent writers (bulk sends, the inbox poller) never lose each other's
/// records. Documents are replaced atomically via a temp file + rename.
pub struct FileConversationStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}")))
    }

    async fn load(&self, id: &str) -> Result<ClientDocument, StoreError> {
        let path = self.path_for(id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ClientDocument::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, id: &str, doc: &ClientDocument) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn append(
        &self,
        id: &str,
        record: MessageRecord,
        contact: Option<&BTreeMap<String, String>>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load(id).await?;
        if doc.client_info.is_none() {
            if let Some(contact) = contact {
                doc.client_info = Some(
                    contact
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                );
            }
        }
        debug!(sa = %id, direction = ?record.direction, "Appending conversation record");
        doc.messages.push(record);
        self.save(id, &doc).await
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn append_sent(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        contact: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let record = MessageRecord {
            direction: Direction::Sent,
            timestamp: now_timestamp(),
            body: body.to_string(),
            phone: phone.to_string(),
        };
        self.append(id, record, Some(contact)).await
    }

    async fn append_received(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        timestamp: Option<&str>,
    ) -> Result<(), StoreError> {
        let record = MessageRecord {
            direction: Direction::Received,
            timestamp: timestamp
                .map(str::to_string)
                .unwrap_or_else(now_timestamp),
            body: body.to_string(),
            phone: phone.to_string(),
        };
        self.append(id, record, None).await
    }

    async fn get_messages(&self, id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self.load(id).await?.messages)
    }

    async fn get_contact_info(&self, id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .load(id)
            .await?
            .client_info
            .unwrap_or_default()
            .iter()
            .filter_map(|(k, v)| value_to_string(v).map(|s| (k.clone(), s)))
            .collect())
    }

    async fn list_ids_with_history(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            match self.load(id).await {
                Ok(doc) if !doc.messages.is_empty() => ids.push(id.to_string()),
                Ok(_) => {}
                Err(e) => warn!(file = name, error = %e, "Skipping unreadable client file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
