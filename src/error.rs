//! Error types for Roster Bridge.

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Inbox error: {0}")]
    Inbox(#[from] InboxError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contact directory (roster) errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Roster file {path} could not be read: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Roster is malformed: {0}")]
    Malformed(String),

    #[error("Column {column} not found in partition {partition}")]
    MissingColumn { partition: String, column: String },

    #[error("Partition {0} not found")]
    UnknownPartition(String),
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid client identifier: {0:?}")]
    InvalidId(String),

    #[error("Record for client {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Request(String),

    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
}

/// Task coordination conflicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("A task is already running")]
    AlreadyRunning,

    #[error("No task is running")]
    NotRunning,

    #[error("Task worker has stopped")]
    WorkerStopped,
}

/// Inbound message file errors.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("Failed to read inbox file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed inbox file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Failed to log inbox file {path}: {source}")]
    Log {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to dispose of inbox file {path}: {source}")]
    Dispose {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
