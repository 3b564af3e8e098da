/// Error types for the Trellis workflow engine.
use crate::task::TaskId;
use thiserror::Error;

/// Error type for dependency store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for dependency store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Non-fatal failure while fetching a project's persisted workflow.
///
/// Loading never aborts on these; the graph falls back to no edges or to
/// auto-layout and the failure is surfaced to the caller as a notice.
#[derive(Error, Debug)]
pub enum LoadFailure {
    #[error("Failed to load task dependencies: {0}")]
    Dependencies(#[source] StoreError),

    #[error("Failed to load node positions: {0}")]
    Positions(#[source] StoreError),
}

/// Error type for the interactive editor controller.
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("A task cannot depend on itself: {0}")]
    SelfDependency(TaskId),

    #[error("No connection is pending")]
    NoPendingConnection,

    #[error("A connection is already pending from {0}")]
    ConnectionPending(TaskId),

    #[error("Condition text is only editable for conditional dependencies")]
    ConditionNotEditable,

    #[error("Conditional dependency {0} -> {1} requires a condition")]
    MissingCondition(TaskId, TaskId),

    #[error("Unknown connection handle: {0}")]
    UnknownHandle(String),

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("A load is already in progress")]
    LoadInProgress,

    #[error("No save is in progress")]
    NoSaveInProgress,

    #[error("Failed to save workflow: {0}")]
    SaveFailed(#[source] StoreError),
}

/// Result type for editor operations.
pub type EditorResult<T> = Result<T, EditorError>;

/// Error type for configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
