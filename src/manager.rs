//! BridgeManager owns the coordinator, the inbox poller and the shared
//! runtime settings, and is the one handle the HTTP layer talks to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{BridgeConfig, RosterColumns, RuntimeSettings};
use crate::coordinator::{
    BulkSendArgs, CoordinatorStatus, ProgressFn, TaskArgs, TaskCoordinator, TaskResult,
};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigError, DirectoryError, GatewayError, StoreError, TaskError};
use crate::gateway::{GatewayStatus, MessageGateway, SendOutcome};
use crate::inbox::{InboundMessage, InboxPoller, Intake, PollReport, log_inbound, spawn_inbox_poller};
use crate::reconcile::{ReconcileReport, reconcile_history};
use crate::roster::{Contact, ContactDirectory};
use crate::store::{ConversationStore, MessageRecord};

/// Minimum accepted delay between bulk messages.
pub const MIN_BULK_DELAY: Duration = Duration::from_secs(1);

/// A client's roster row (if still present) and conversation log.
#[derive(Debug, Clone, Serialize)]
pub struct ClientHistory {
    pub id: String,
    pub contact: Option<Contact>,
    pub info: BTreeMap<String, String>,
    pub messages: Vec<MessageRecord>,
}

/// Webhook deliveries seen and logged since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WebhookStats {
    pub received: u64,
    pub processed: u64,
}

#[derive(Debug, Default)]
struct WebhookCounters {
    received: AtomicU64,
    processed: AtomicU64,
}

pub struct BridgeManager {
    dispatcher: Dispatcher,
    coordinator: Arc<TaskCoordinator>,
    settings: Arc<RwLock<RuntimeSettings>>,
    columns: RosterColumns,
    inbox: Arc<InboxPoller>,
    poller: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
    webhook: WebhookCounters,
    startup_report: ReconcileReport,
}

impl BridgeManager {
    /// Start the worker and the inbox poller, then run the startup
    /// reconciliation before returning.
    pub async fn start(
        config: &BridgeConfig,
        directory: Arc<dyn ContactDirectory>,
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn MessageGateway>,
    ) -> crate::error::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.inbox.dir)
            .await
            .map_err(ConfigError::Io)?;

        let dispatcher = Dispatcher::new(directory, store, gateway);
        let settings = Arc::new(RwLock::new(config.settings.clone()));

        let coordinator =
            TaskCoordinator::start(dispatcher.clone(), Arc::clone(&settings), config.retention);

        let inbox = Arc::new(InboxPoller::new(
            config.inbox.clone(),
            dispatcher.clone(),
            Arc::clone(&settings),
            config.columns.name.clone(),
        ));
        let poller = spawn_inbox_poller(Arc::clone(&inbox));

        let startup_report = {
            let snapshot = settings.read().await.clone();
            reconcile_history(&dispatcher, &snapshot, &config.columns.name, Utc::now()).await
        };

        info!(replied = startup_report.replied, "Bridge started");

        Ok(Arc::new(Self {
            dispatcher,
            coordinator,
            settings,
            columns: config.columns.clone(),
            inbox,
            poller: Mutex::new(Some(poller)),
            webhook: WebhookCounters::default(),
            startup_report,
        }))
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    /// Queue a bulk send. `ids = None` targets the whole active partition.
    pub fn submit_bulk_send(
        &self,
        ids: Option<Vec<String>>,
        template: &str,
        on_progress: Option<ProgressFn>,
        dedupe: bool,
    ) -> Result<String, TaskError> {
        let mut args = BulkSendArgs::new(template).with_dedupe(dedupe);
        if let Some(ids) = ids {
            args = args.with_ids(ids);
        }
        if let Some(cb) = on_progress {
            args = args.with_progress(cb);
        }
        self.coordinator.submit(TaskArgs::BulkSend(args))
    }

    pub fn poll_task(&self, task_id: &str) -> Option<TaskResult> {
        self.coordinator.poll(task_id)
    }

    pub fn cancel_task(&self) -> Result<String, TaskError> {
        self.coordinator.cancel()
    }

    pub fn is_task_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub fn task_status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    // ── Settings ────────────────────────────────────────────────────────

    pub async fn settings(&self) -> RuntimeSettings {
        self.settings.read().await.clone()
    }

    /// Toggle auto-reply; a non-empty `message` also replaces the reply text.
    pub async fn set_auto_reply(&self, enabled: bool, message: Option<String>) {
        let mut settings = self.settings.write().await;
        settings.auto_reply_enabled = enabled;
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            settings.auto_reply_message = message;
        }
        info!(enabled, message = %settings.auto_reply_message, "Auto-reply updated");
    }

    /// Set the delay between bulk messages (clamped to at least one second).
    /// Takes effect from the next task.
    pub async fn set_bulk_delay_seconds(&self, seconds: u64) -> Duration {
        self.set_bulk_delay(Duration::from_secs(seconds)).await
    }

    pub async fn set_bulk_delay(&self, delay: Duration) -> Duration {
        let delay = delay.max(MIN_BULK_DELAY);
        self.settings.write().await.bulk_delay = delay;
        info!(delay_secs = delay.as_secs(), "Bulk delay updated");
        delay
    }

    // ── Messaging ───────────────────────────────────────────────────────

    pub async fn send_single(&self, phone: &str, body: &str, id: Option<&str>) -> SendOutcome {
        self.dispatcher.send(phone, body, id).await
    }

    pub async fn check_status(&self) -> Result<GatewayStatus, GatewayError> {
        self.dispatcher.gateway().check_status().await
    }

    // ── Roster & history ────────────────────────────────────────────────

    pub async fn list_partitions(&self) -> Result<Vec<String>, DirectoryError> {
        self.dispatcher.directory().list_partitions().await
    }

    pub async fn active_partition(&self) -> Option<String> {
        self.dispatcher.directory().active_partition().await
    }

    pub async fn switch_partition(&self, name: &str) -> Result<bool, DirectoryError> {
        self.dispatcher.directory().switch_partition(name).await
    }

    pub async fn clients_with_history(&self) -> Result<Vec<String>, StoreError> {
        self.dispatcher.store().list_ids_with_history().await
    }

    pub async fn client_history(&self, id: &str) -> Result<ClientHistory, StoreError> {
        let store = self.dispatcher.store();
        let messages = store.get_messages(id).await?;
        let info = store.get_contact_info(id).await?;
        let contact = self
            .dispatcher
            .directory()
            .resolve_by_id(id)
            .await
            .unwrap_or_else(|e| {
                error!(sa = %id, error = %e, "Roster lookup failed");
                None
            });
        Ok(ClientHistory {
            id: id.to_string(),
            contact,
            info,
            messages,
        })
    }

    // ── Background work ─────────────────────────────────────────────────

    pub async fn reconcile_now(&self) -> ReconcileReport {
        let snapshot = self.settings().await;
        reconcile_history(&self.dispatcher, &snapshot, &self.columns.name, Utc::now()).await
    }

    pub fn startup_report(&self) -> ReconcileReport {
        self.startup_report
    }

    /// Scan the inbox immediately instead of waiting for the next tick.
    pub async fn poll_inbox_now(&self) -> PollReport {
        self.inbox.poll_once().await
    }

    // ── Webhook ─────────────────────────────────────────────────────────

    /// Log a message the bot pushed to the webhook. Events without a chat
    /// sender (`from`) are counted and ignored, returning `None`.
    ///
    /// Never auto-replies: the poller answers the inbox copy of the message.
    pub async fn receive_webhook(
        &self,
        msg: &InboundMessage,
    ) -> crate::error::Result<Option<Intake>> {
        self.webhook.received.fetch_add(1, Ordering::Relaxed);
        if msg.from.is_none() {
            debug!("Webhook event without a chat sender ignored");
            return Ok(None);
        }

        let intake = log_inbound(&self.dispatcher, msg).await?;
        if matches!(intake, Intake::Logged(_)) {
            self.webhook.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Some(intake))
    }

    /// Point the gateway's webhook at `url`.
    pub async fn register_webhook(&self, url: &str) -> crate::error::Result<SendOutcome> {
        let outcome = self.dispatcher.gateway().set_webhook(url).await?;
        if outcome.success {
            info!(url = %url, "Webhook registered with gateway");
        }
        Ok(outcome)
    }

    pub fn webhook_stats(&self) -> WebhookStats {
        WebhookStats {
            received: self.webhook.received.load(Ordering::Relaxed),
            processed: self.webhook.processed.load(Ordering::Relaxed),
        }
    }

    /// Stop the poller and the worker. The running task, if any, is cancelled.
    pub async fn shutdown(&self) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some((handle, stop)) = poller {
            stop.cancel();
            if let Err(e) = handle.await {
                error!("Inbox poller panicked: {e}");
            }
        }
        self.coordinator.shutdown().await;
        info!("Bridge stopped");
    }
}
