// Trellis: workflow dependency engine for construction projects
// Core library providing the graph model, layout, analysis, persistence and editor controller

pub mod analysis;
pub mod config;
pub mod editor;
pub mod errors;
pub mod graph;
pub mod layout;
pub mod loader;
pub mod sqlite_store;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use errors::{
    ConfigError, ConfigResult, EditorError, EditorResult, LoadFailure, StoreError, StoreResult,
};

pub use task::{ProjectId, Task, TaskId, TaskPriority, TaskStatus};

pub use graph::{Adjacency, DependencyEdge, EdgeKind, WorkflowGraph};

pub use layout::{assign_levels, Layout, LayoutEngine, Levels, Position, PositionMap};

pub use analysis::{analyze, WorkflowAnalysis, WorkflowStatistics};

pub use store::{DependencyRecord, DependencyStore, InMemoryDependencyStore, PositionRecord};

pub use sqlite_store::SqliteDependencyStore;

pub use loader::{analyze_project, load_workflow, LoadedWorkflow};

pub use editor::{
    ConnectionHandle, EdgeDraft, EditorState, NodeView, SaveOutcome, SaveReport, SaveRequest,
    WorkflowEditor,
};

pub use config::{ConfigManager, LayoutConfig, LoggingConfig, StorageConfig, TrellisConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
