//! Task coordination: one long-running task at a time, run by a dedicated
//! worker, with cooperative cancellation and pollable results.

pub mod bulk;
pub mod results;
pub mod task;
pub mod worker;

pub use results::ResultRegistry;
pub use task::{
    BulkSendArgs, ItemOutcome, Progress, ProgressFn, Task, TaskArgs, TaskKind, TaskResult,
};
pub use worker::{CoordinatorStatus, TaskCoordinator};
