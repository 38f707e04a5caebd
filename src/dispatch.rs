//! Dispatcher: the single "send, then log" path.
//!
//! Bulk sends, auto-replies, catch-up replies and one-off sends all go through
//! here so a successful delivery always lands in the conversation log.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::gateway::{MessageGateway, SendOutcome};
use crate::roster::ContactDirectory;
use crate::store::ConversationStore;

/// Shared handles to the three collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<dyn ContactDirectory>,
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn MessageGateway>,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn MessageGateway>,
    ) -> Self {
        Self {
            directory,
            store,
            gateway,
        }
    }

    pub fn directory(&self) -> &Arc<dyn ContactDirectory> {
        &self.directory
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn MessageGateway> {
        &self.gateway
    }

    /// Send `body` to `phone`. When `id` is given and the send succeeds, a
    /// SENT record is appended, with the roster row as client info.
    pub async fn send(&self, phone: &str, body: &str, id: Option<&str>) -> SendOutcome {
        let Some(id) = id else {
            return self.deliver(phone, body).await;
        };
        let snapshot = match self.directory.resolve_by_id(id).await {
            Ok(Some(contact)) => contact.fields,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(sa = %id, error = %e, "Roster lookup failed, logging without client info");
                BTreeMap::new()
            }
        };
        self.send_logged(phone, body, id, &snapshot).await
    }

    /// Send and log against `id` with an already-known client snapshot.
    pub async fn send_logged(
        &self,
        phone: &str,
        body: &str,
        id: &str,
        snapshot: &BTreeMap<String, String>,
    ) -> SendOutcome {
        let outcome = self.deliver(phone, body).await;
        if outcome.success {
            if let Err(e) = self.store.append_sent(id, phone, body, snapshot).await {
                warn!(sa = %id, error = %e, "Message sent but not logged");
            }
        }
        outcome
    }

    async fn deliver(&self, phone: &str, body: &str) -> SendOutcome {
        match self.gateway.send_message(phone, body).await {
            Ok(outcome) => {
                if outcome.success {
                    info!(phone = phone, "Message delivered");
                }
                outcome
            }
            Err(e) => {
                warn!(phone = phone, error = %e, "Gateway call failed");
                SendOutcome::failed(format!("Error: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use crate::testing::{StubGateway, memory_fixture};

    #[tokio::test]
    async fn success_is_logged_with_roster_snapshot() {
        let fx = memory_fixture(StubGateway::accepting());
        let outcome = fx.dispatcher.send("5511999990000", "oi", Some("100")).await;
        assert!(outcome.success);

        let msgs = fx.store.get_messages("100").await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].direction, Direction::Sent);
        assert_eq!(fx.store.get_contact_info("100").await.unwrap()["Nome"], "Ana");
    }

    #[tokio::test]
    async fn failure_is_not_logged() {
        let fx = memory_fixture(StubGateway::refusing("not ready"));
        let outcome = fx.dispatcher.send("5511999990000", "oi", Some("100")).await;
        assert!(!outcome.success);
        assert!(fx.store.get_messages("100").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_error_becomes_failed_outcome() {
        let fx = memory_fixture(StubGateway::unreachable());
        let outcome = fx.dispatcher.send("5511999990000", "oi", None).await;
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn anonymous_send_is_not_logged() {
        let fx = memory_fixture(StubGateway::accepting());
        assert!(fx.dispatcher.send("5511999990000", "oi", None).await.success);
        assert!(fx.store.list_ids_with_history().await.unwrap().is_empty());
        assert_eq!(fx.gateway.sent().len(), 1);
    }
}
