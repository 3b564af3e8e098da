/// Dependency store adapter.
///
/// Persists a project's dependency edges and node positions. Every record is
/// scoped by project id; edges are replaced as a whole while positions are
/// upserted per (project, task).
use crate::errors::StoreResult;
use crate::graph::DependencyEdge;
use crate::layout::Position;
use crate::task::{ProjectId, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Persisted dependency row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub source_task_id: TaskId,
    pub target_task_id: TaskId,
    #[serde(default)]
    pub condition: Option<String>,
}

impl From<&DependencyEdge> for DependencyRecord {
    fn from(edge: &DependencyEdge) -> Self {
        DependencyRecord {
            source_task_id: edge.source.clone(),
            target_task_id: edge.target.clone(),
            condition: edge.condition.clone(),
        }
    }
}

impl From<DependencyRecord> for DependencyEdge {
    fn from(record: DependencyRecord) -> Self {
        DependencyEdge::new(
            record.source_task_id,
            record.target_task_id,
            record.condition,
        )
    }
}

/// Persisted node position row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub position_x: f64,
    pub position_y: f64,
}

impl PositionRecord {
    pub fn new(project_id: ProjectId, task_id: TaskId, position: Position) -> Self {
        PositionRecord {
            project_id,
            task_id,
            position_x: position.x,
            position_y: position.y,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.position_x, self.position_y)
    }
}

/// Persistence for workflow edges and node positions
#[async_trait]
pub trait DependencyStore: Send + Sync {
    /// All dependencies of a project, in insertion order
    async fn list_dependencies(&self, project_id: &ProjectId) -> StoreResult<Vec<DependencyRecord>>;

    /// Replace all dependencies of a project with `dependencies`.
    /// Later duplicates of a (source, target) pair overwrite earlier ones.
    async fn replace_dependencies(
        &self,
        project_id: &ProjectId,
        dependencies: &[DependencyRecord],
    ) -> StoreResult<()>;

    /// All saved node positions of a project
    async fn list_positions(&self, project_id: &ProjectId) -> StoreResult<Vec<PositionRecord>>;

    /// Insert or update positions keyed by (project, task)
    async fn upsert_positions(&self, positions: &[PositionRecord]) -> StoreResult<()>;
}

/// Collapse duplicate pairs, keeping the first slot and the last value
pub(crate) fn dedupe_dependencies(dependencies: &[DependencyRecord]) -> Vec<DependencyRecord> {
    let mut slots: HashMap<(&TaskId, &TaskId), usize> = HashMap::new();
    let mut out: Vec<DependencyRecord> = Vec::with_capacity(dependencies.len());
    for record in dependencies {
        let key = (&record.source_task_id, &record.target_task_id);
        match slots.get(&key) {
            Some(&slot) => out[slot] = record.clone(),
            None => {
                slots.insert(key, out.len());
                out.push(record.clone());
            }
        }
    }
    out
}

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryDependencyStore {
    dependencies: RwLock<HashMap<ProjectId, Vec<DependencyRecord>>>,
    positions: RwLock<HashMap<ProjectId, BTreeMap<TaskId, PositionRecord>>>,
}

impl InMemoryDependencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DependencyStore for InMemoryDependencyStore {
    async fn list_dependencies(&self, project_id: &ProjectId) -> StoreResult<Vec<DependencyRecord>> {
        Ok(self
            .dependencies
            .read()
            .await
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_dependencies(
        &self,
        project_id: &ProjectId,
        dependencies: &[DependencyRecord],
    ) -> StoreResult<()> {
        let records = dedupe_dependencies(dependencies);
        let mut all = self.dependencies.write().await;
        if records.is_empty() {
            all.remove(project_id);
        } else {
            all.insert(project_id.clone(), records);
        }
        Ok(())
    }

    async fn list_positions(&self, project_id: &ProjectId) -> StoreResult<Vec<PositionRecord>> {
        Ok(self
            .positions
            .read()
            .await
            .get(project_id)
            .map(|by_task| by_task.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_positions(&self, positions: &[PositionRecord]) -> StoreResult<()> {
        let mut all = self.positions.write().await;
        for record in positions {
            all.entry(record.project_id.clone())
                .or_default()
                .insert(record.task_id.clone(), record.clone());
        }
        Ok(())
    }
}
