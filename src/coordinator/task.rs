//! Task types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Progress callback: `(completed, total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Kinds of long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    BulkSend,
}

impl TaskKind {
    /// Prefix used in task ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::BulkSend => "bulk",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkSend => write!(f, "bulk_send"),
        }
    }
}

/// Arguments of a bulk send.
#[derive(Clone)]
pub struct BulkSendArgs {
    /// Restrict the batch to these identifiers (whole active partition when `None`).
    pub ids: Option<Vec<String>>,
    /// Message template with `{field}` placeholders.
    pub template: String,
    /// Send at most once per identifier.
    pub dedupe: bool,
    pub on_progress: Option<ProgressFn>,
}

impl BulkSendArgs {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            ids: None,
            template: template.into(),
            dedupe: true,
            on_progress: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}

impl fmt::Debug for BulkSendArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkSendArgs")
            .field("ids", &self.ids)
            .field("template", &self.template)
            .field("dedupe", &self.dedupe)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Kind-specific task arguments.
#[derive(Debug, Clone)]
pub enum TaskArgs {
    BulkSend(BulkSendArgs),
}

impl TaskArgs {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::BulkSend(_) => TaskKind::BulkSend,
        }
    }
}

/// A queued unit of work.
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub args: TaskArgs,
    pub(crate) cancel: CancellationToken,
}

/// Live progress of the running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Outcome of one message of a bulk send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub phone: String,
    pub id: String,
    pub success: bool,
    pub message: String,
}

/// Final result of a task, retained for polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: TaskKind,
    /// `false` when the task errored, found nothing to do, or was cancelled.
    pub success: bool,
    /// Messages planned (contacts with a phone, after dedupe).
    pub total: usize,
    /// Messages the gateway accepted.
    pub sent: usize,
    pub cancelled: bool,
    pub items: Vec<ItemOutcome>,
    /// Identifiers skipped for lacking a phone number.
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub duplicates_skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// A result for a task that produced no per-item work.
    pub fn failed(task_id: &str, kind: TaskKind, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            success: false,
            total: 0,
            sent: 0,
            cancelled: false,
            items: Vec::new(),
            excluded: Vec::new(),
            duplicates_skipped: 0,
            message: Some(message.into()),
            finished_at: Utc::now(),
        }
    }

    /// Number of attempts that failed.
    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| !i.success).count()
    }
}
