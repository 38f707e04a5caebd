//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, StoreError};
use crate::gateway::{GatewayStatus, MessageGateway, SendOutcome};
use crate::roster::{Contact, JsonRoster};
use crate::store::{ConversationStore, Direction, MessageRecord};

enum Mode {
    Accept,
    Refuse(String),
    Unreachable,
}

/// Gateway that records every attempt.
pub struct StubGateway {
    mode: Mode,
    fail_phones: HashSet<String>,
    attempts: Mutex<Vec<(String, String)>>,
    webhook: Mutex<Option<String>>,
}

impl StubGateway {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            fail_phones: HashSet::new(),
            attempts: Mutex::new(Vec::new()),
            webhook: Mutex::new(None),
        }
    }

    pub fn accepting() -> Self {
        Self::with_mode(Mode::Accept)
    }

    pub fn refusing(reason: &str) -> Self {
        Self::with_mode(Mode::Refuse(reason.to_string()))
    }

    pub fn unreachable() -> Self {
        Self::with_mode(Mode::Unreachable)
    }

    /// Accept everything except these phones, which error at transport level.
    pub fn failing_for(phones: &[&str]) -> Self {
        let mut gw = Self::accepting();
        gw.fail_phones = phones.iter().map(|p| p.to_string()).collect();
        gw
    }

    /// Every `(phone, body)` the gateway was asked to send.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.attempts.lock().unwrap().clone()
    }

    /// The last webhook URL registered.
    pub fn webhook(&self) -> Option<String> {
        self.webhook.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGateway for StubGateway {
    async fn check_status(&self) -> Result<GatewayStatus, GatewayError> {
        match &self.mode {
            Mode::Unreachable => Err(GatewayError::Request("connection refused".into())),
            Mode::Refuse(reason) => Ok(GatewayStatus {
                ready: false,
                error: Some(reason.clone()),
            }),
            Mode::Accept => Ok(GatewayStatus {
                ready: true,
                error: None,
            }),
        }
    }

    async fn send_message(&self, phone: &str, body: &str) -> Result<SendOutcome, GatewayError> {
        self.attempts
            .lock()
            .unwrap()
            .push((phone.to_string(), body.to_string()));
        if self.fail_phones.contains(phone) {
            return Err(GatewayError::Request("connection reset".into()));
        }
        match &self.mode {
            Mode::Accept => Ok(SendOutcome::ok("sent")),
            Mode::Refuse(reason) => Ok(SendOutcome::failed(reason.clone())),
            Mode::Unreachable => Err(GatewayError::Request("connection refused".into())),
        }
    }

    async fn set_webhook(&self, url: &str) -> Result<SendOutcome, GatewayError> {
        match &self.mode {
            Mode::Unreachable => Err(GatewayError::Request("connection refused".into())),
            Mode::Refuse(reason) => Ok(SendOutcome::failed(reason.clone())),
            Mode::Accept => {
                *self.webhook.lock().unwrap() = Some(url.to_string());
                Ok(SendOutcome::ok("Webhook configurado"))
            }
        }
    }
}

#[derive(Default)]
struct ClientLog {
    info: BTreeMap<String, String>,
    messages: Vec<MessageRecord>,
}

/// Conversation store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    clients: Mutex<BTreeMap<String, ClientLog>>,
}

impl MemoryStore {
    /// Seed a record with an explicit timestamp.
    pub fn push(&self, id: &str, direction: Direction, timestamp: &str, phone: &str) {
        self.clients
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .messages
            .push(MessageRecord {
                direction,
                timestamp: timestamp.to_string(),
                body: "seeded".to_string(),
                phone: phone.to_string(),
            });
    }

    pub fn set_info(&self, id: &str, key: &str, value: &str) {
        self.clients
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .info
            .insert(key.to_string(), value.to_string());
    }

    pub fn record_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap()
            .values()
            .map(|c| c.messages.len())
            .sum()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append_sent(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        contact: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut clients = self.clients.lock().unwrap();
        let log = clients.entry(id.to_string()).or_default();
        if log.info.is_empty() {
            log.info = contact.clone();
        }
        log.messages.push(MessageRecord {
            direction: Direction::Sent,
            timestamp: chrono::Utc::now().to_rfc3339(),
            body: body.to_string(),
            phone: phone.to_string(),
        });
        Ok(())
    }

    async fn append_received(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        timestamp: Option<&str>,
    ) -> Result<(), StoreError> {
        let timestamp = timestamp
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        self.clients
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .messages
            .push(MessageRecord {
                direction: Direction::Received,
                timestamp,
                body: body.to_string(),
                phone: phone.to_string(),
            });
        Ok(())
    }

    async fn get_messages(&self, id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self
            .clients
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }

    async fn get_contact_info(&self, id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .clients
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.info.clone())
            .unwrap_or_default())
    }

    async fn list_ids_with_history(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| !c.messages.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }
}

pub fn contact(id: &str, phone: Option<&str>, name: &str) -> Contact {
    let mut fields = BTreeMap::new();
    fields.insert("SA".to_string(), id.to_string());
    fields.insert("Nome".to_string(), name.to_string());
    if let Some(phone) = phone {
        fields.insert("Telefone".to_string(), phone.to_string());
    }
    Contact {
        id: id.to_string(),
        phone: phone.map(str::to_string),
        fields,
    }
}

/// Two partitions; "Janeiro" is active.
pub fn sample_roster() -> JsonRoster {
    JsonRoster::from_partitions(vec![
        (
            "Janeiro".to_string(),
            vec![
                contact("100", Some("5511999990000"), "Ana"),
                contact("101", Some("5511988887777"), "Bruno"),
                contact("102", None, "Carla"),
                contact("100", Some("5511999990000"), "Ana"),
                contact("103", Some("5511977776666"), "Duda"),
            ],
        ),
        (
            "Fevereiro".to_string(),
            vec![contact("200", Some("5521966665555"), "Eva")],
        ),
    ])
}

pub struct Fixture {
    pub roster: Arc<JsonRoster>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<StubGateway>,
    pub dispatcher: Dispatcher,
}

pub fn memory_fixture(gateway: StubGateway) -> Fixture {
    let roster = Arc::new(sample_roster());
    let store = Arc::new(MemoryStore::default());
    let gateway = Arc::new(gateway);
    let dispatcher = Dispatcher::new(roster.clone(), store.clone(), gateway.clone());
    Fixture {
        roster,
        store,
        gateway,
        dispatcher,
    }
}
