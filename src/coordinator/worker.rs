//! Single-slot task queue served by one dedicated worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::bulk::run_bulk_send;
use super::results::ResultRegistry;
use super::task::{Progress, Task, TaskArgs, TaskResult};
use crate::config::{ResultRetention, RuntimeSettings};
use crate::dispatch::Dispatcher;
use crate::error::TaskError;

/// Queue depth. Submission is rejected while a task is pending or running, so
/// one slot is all the worker ever needs.
const QUEUE_DEPTH: usize = 1;

#[derive(Debug, Default)]
struct RuntimeState {
    running: bool,
    current_task_id: Option<String>,
    cancel: Option<CancellationToken>,
    progress: Option<Progress>,
}

/// Snapshot of the coordinator for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub current_task_id: Option<String>,
    pub progress: Option<Progress>,
    pub cancel_requested: bool,
}

type SharedState = Arc<Mutex<RuntimeState>>;
type SharedResults = Arc<Mutex<ResultRegistry>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the task queue, the runtime state and the result registry.
pub struct TaskCoordinator {
    state: SharedState,
    results: SharedResults,
    queue: mpsc::Sender<Task>,
    seq: AtomicU64,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskCoordinator {
    /// Spawn the worker and return the coordinator handle.
    pub fn start(
        dispatcher: Dispatcher,
        settings: Arc<RwLock<RuntimeSettings>>,
        retention: ResultRetention,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let state: SharedState = Arc::new(Mutex::new(RuntimeState::default()));
        let results: SharedResults = Arc::new(Mutex::new(ResultRegistry::new(retention)));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_worker(
            rx,
            dispatcher,
            settings,
            Arc::clone(&state),
            Arc::clone(&results),
            shutdown.clone(),
        ));

        Arc::new(Self {
            state,
            results,
            queue: tx,
            seq: AtomicU64::new(0),
            shutdown,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Enqueue a task. Rejected while another task is pending or running.
    pub fn submit(&self, args: TaskArgs) -> Result<String, TaskError> {
        let mut state = lock(&self.state);
        if state.running {
            return Err(TaskError::AlreadyRunning);
        }
        if self.shutdown.is_cancelled() {
            return Err(TaskError::WorkerStopped);
        }

        let kind = args.kind();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let task_id = format!("{}_{}_{seq}", kind.id_prefix(), Utc::now().timestamp_millis());
        let cancel = self.shutdown.child_token();

        let task = Task {
            id: task_id.clone(),
            args,
            cancel: cancel.clone(),
        };
        match self.queue.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => return Err(TaskError::AlreadyRunning),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(TaskError::WorkerStopped),
        }

        state.running = true;
        state.current_task_id = Some(task_id.clone());
        state.cancel = Some(cancel);
        state.progress = None;

        info!(task_id = %task_id, kind = %kind, "Task queued");
        Ok(task_id)
    }

    /// Result of a finished task. `None` while it runs or for unknown ids.
    pub fn poll(&self, task_id: &str) -> Option<TaskResult> {
        lock(&self.results).get(task_id).cloned()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Ask the running task to stop at its next checkpoint. Returns its id.
    pub fn cancel(&self) -> Result<String, TaskError> {
        let state = lock(&self.state);
        if !state.running {
            return Err(TaskError::NotRunning);
        }
        if let Some(token) = &state.cancel {
            token.cancel();
        }
        let task_id = state.current_task_id.clone().unwrap_or_default();
        info!(task_id = %task_id, "Cancellation requested");
        Ok(task_id)
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = lock(&self.state);
        CoordinatorStatus {
            running: state.running,
            current_task_id: state.current_task_id.clone(),
            progress: state.progress,
            cancel_requested: state.cancel.as_ref().is_some_and(|t| t.is_cancelled()),
        }
    }

    /// Cancel the running task (if any) and stop the worker.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Task worker panicked: {e}");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Task>,
    dispatcher: Dispatcher,
    settings: Arc<RwLock<RuntimeSettings>>,
    state: SharedState,
    results: SharedResults,
    shutdown: CancellationToken,
) {
    info!("Task worker started");

    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let task_id = task.id.clone();
        let kind = task.args.kind();
        let delay = settings.read().await.bulk_delay;
        info!(task_id = %task_id, kind = %kind, "Task started");

        // Run on its own task so a panic in a collaborator is contained.
        let exec = tokio::spawn(execute(task, dispatcher.clone(), delay, Arc::clone(&state)));
        let result = match exec.await {
            Ok(result) => result,
            Err(e) => {
                error!(task_id = %task_id, "Task execution failed: {e}");
                TaskResult::failed(&task_id, kind, format!("task execution failed: {e}"))
            }
        };

        lock(&results).insert(result);
        *lock(&state) = RuntimeState::default();
        info!(task_id = %task_id, "Task finished");
    }

    rx.close();
    // A task accepted but never started still needs a result.
    while let Ok(task) = rx.try_recv() {
        warn!(task_id = %task.id, "Dropping queued task on shutdown");
        let mut result = TaskResult::failed(&task.id, task.args.kind(), "worker stopped");
        result.cancelled = true;
        lock(&results).insert(result);
    }
    *lock(&state) = RuntimeState::default();
    info!("Task worker stopped");
}

async fn execute(
    task: Task,
    dispatcher: Dispatcher,
    delay: std::time::Duration,
    state: SharedState,
) -> TaskResult {
    match &task.args {
        TaskArgs::BulkSend(args) => {
            let on_progress = args.on_progress.clone();
            let report = move |completed: usize, total: usize| {
                lock(&state).progress = Some(Progress { completed, total });
                if let Some(cb) = &on_progress {
                    cb(completed, total);
                }
            };
            run_bulk_send(&task.id, args, &dispatcher, delay, &task.cancel, &report).await
        }
    }
}
