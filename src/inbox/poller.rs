//! Inbox poller: scans the drop directory on a fixed interval.
//!
//! Each pending file is parsed, matched to a roster client by phone, logged
//! as RECEIVED and (when enabled) answered with an auto-reply. The file is
//! disposed of only after processing, so a crash mid-scan replays it on the
//! next start instead of losing it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::intake::{Intake, log_inbound};
use super::message::InboundMessage;
use crate::config::{InboxConfig, InboxDisposition, RuntimeSettings};
use crate::dispatch::Dispatcher;
use crate::error::InboxError;
use crate::template::auto_reply_text;

const FILE_PREFIX: &str = "received_";
const PROCESSED_DIR: &str = "processed";
const FAILED_DIR: &str = "failed";

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Files picked up.
    pub files: usize,
    /// Messages appended to a client log.
    pub logged: usize,
    /// Messages whose sender is not in the roster (or was missing).
    pub unmatched: usize,
    pub replied: usize,
    pub malformed: usize,
}

enum Disposal {
    Processed,
    Failed,
}

/// Everything one scan needs.
pub struct InboxPoller {
    config: InboxConfig,
    dispatcher: Dispatcher,
    settings: Arc<RwLock<RuntimeSettings>>,
    name_column: String,
}

impl InboxPoller {
    pub fn new(
        config: InboxConfig,
        dispatcher: Dispatcher,
        settings: Arc<RwLock<RuntimeSettings>>,
        name_column: impl Into<String>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            settings,
            name_column: name_column.into(),
        }
    }

    /// Process every pending file once, in file-name order.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();

        let files = match self.pending_files().await {
            Ok(files) => files,
            Err(e) => {
                error!("Inbox scan failed: {e}");
                return report;
            }
        };
        if files.is_empty() {
            return report;
        }
        debug!("Found {} pending inbox files", files.len());

        for path in files {
            report.files += 1;
            match self.process_file(&path, &mut report).await {
                Ok(disposal) => {
                    if let Err(e) = self.dispose(&path, disposal).await {
                        error!("{e}");
                    }
                }
                // Left in place; the next tick retries it.
                Err(e) => error!("{e}"),
            }
        }

        if report.logged > 0 || report.unmatched > 0 || report.malformed > 0 {
            info!(
                files = report.files,
                logged = report.logged,
                unmatched = report.unmatched,
                replied = report.replied,
                malformed = report.malformed,
                "Inbox scan complete"
            );
        }
        report
    }

    async fn pending_files(&self) -> Result<Vec<PathBuf>, InboxError> {
        let dir = &self.config.dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(InboxError::Read {
                    path: dir.display().to_string(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(InboxError::Read {
                        path: dir.display().to_string(),
                        source,
                    });
                }
            };
            let path = entry.path();
            let is_pending = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"));
            if is_pending && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn process_file(
        &self,
        path: &Path,
        report: &mut PollReport,
    ) -> Result<Disposal, InboxError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InboxError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let msg = match InboundMessage::parse(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                let err = InboxError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!("{err}");
                report.malformed += 1;
                return Ok(Disposal::Failed);
            }
        };

        let contact = match log_inbound(&self.dispatcher, &msg).await {
            Ok(Intake::Logged(contact)) => contact,
            Ok(Intake::NoSender | Intake::Unmatched) => {
                report.unmatched += 1;
                return Ok(Disposal::Processed);
            }
            Err(source) => {
                return Err(InboxError::Log {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        report.logged += 1;

        let settings = self.settings.read().await.clone();
        if settings.auto_reply_enabled {
            tokio::time::sleep(settings.reply_pause).await;
            let text = auto_reply_text(
                &settings.auto_reply_message,
                contact.field(&self.name_column),
            );
            let outcome = self
                .dispatcher
                .send_logged(&msg.contact_number, &text, &contact.id, &contact.fields)
                .await;
            if outcome.success {
                report.replied += 1;
            } else {
                warn!(
                    sa = %contact.id,
                    reason = outcome.message.as_deref().unwrap_or("unknown"),
                    "Auto-reply not delivered"
                );
            }
        }

        Ok(Disposal::Processed)
    }

    async fn dispose(&self, path: &Path, disposal: Disposal) -> Result<(), InboxError> {
        let wrap = |source: std::io::Error| InboxError::Dispose {
            path: path.display().to_string(),
            source,
        };

        match self.config.disposition {
            InboxDisposition::Delete => tokio::fs::remove_file(path).await.map_err(wrap),
            InboxDisposition::Archive => {
                let sub = match disposal {
                    Disposal::Processed => PROCESSED_DIR,
                    Disposal::Failed => FAILED_DIR,
                };
                let target_dir = self.config.dir.join(sub);
                tokio::fs::create_dir_all(&target_dir).await.map_err(wrap)?;
                let Some(name) = path.file_name() else {
                    return tokio::fs::remove_file(path).await.map_err(wrap);
                };
                tokio::fs::rename(path, target_dir.join(name))
                    .await
                    .map_err(wrap)
            }
        }
    }
}

/// Spawn the poll loop. Cancel the returned token to stop it.
pub fn spawn_inbox_poller(poller: Arc<InboxPoller>) -> (JoinHandle<()>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();

    let handle = tokio::spawn(async move {
        info!(
            "Inbox poller started, scanning {} every {}s",
            poller.config.dir.display(),
            poller.config.poll_interval.as_secs()
        );

        let mut tick = tokio::time::interval(poller.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => {}
            }
            poller.poll_once().await;
        }

        info!("Inbox poller shutting down");
    });

    (handle, shutdown)
}
