/// Task reference model.
///
/// Tasks are owned by an external task provider; the workflow engine only
/// reads them to decide graph membership and to render node summaries.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum description length shown on a node before truncation.
pub const DESCRIPTION_PREVIEW_LEN: usize = 50;

/// Label rendered for a node whose task could not be resolved.
pub const UNKNOWN_TASK_LABEL: &str = "Unknown Task";

/// Opaque identifier of a task within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        TaskId(id)
    }
}

/// Opaque identifier of a project. Every persisted record is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ProjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        ProjectId(id.to_string())
    }
}

/// Progress status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Delayed,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Delayed => "Delayed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Priority of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    pub fn label(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "Critical",
            TaskPriority::High => "High",
            TaskPriority::Medium => "Medium",
            TaskPriority::Low => "Low",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A task as supplied by the task provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            name: name.into(),
            description: None,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Short description for node summaries
    pub fn description_preview(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            None | Some("") => "No description".to_string(),
            Some(text) if text.chars().count() > DESCRIPTION_PREVIEW_LEN => {
                let head: String = text.chars().take(DESCRIPTION_PREVIEW_LEN).collect();
                format!("{}...", head)
            }
            Some(text) => text.to_string(),
        }
    }

    /// Case-insensitive match of `query` against name or description.
    /// The query is expected to be lowercased already.
    pub(crate) fn matches_lowercase(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(query))
                .unwrap_or(false)
    }
}
