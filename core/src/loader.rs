/// Loading a project's workflow from a dependency store.
use crate::analysis::{analyze, WorkflowAnalysis};
use crate::errors::{LoadFailure, StoreResult};
use crate::graph::{DependencyEdge, WorkflowGraph};
use crate::layout::PositionMap;
use crate::store::DependencyStore;
use crate::task::{ProjectId, Task};
use tracing::{debug, warn};

/// Everything read from the store for one project
#[derive(Debug, Default)]
pub struct LoadedWorkflow {
    pub graph: WorkflowGraph,

    /// Saved positions of tasks that belong to the graph
    pub saved_positions: PositionMap,

    /// Persisted edges referencing a task outside the task list
    pub quarantined: Vec<DependencyEdge>,

    /// Fetches that failed; the affected part fell back to empty
    pub failures: Vec<LoadFailure>,
}

impl LoadedWorkflow {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Load edges and positions for `project_id`, never failing.
///
/// A failed dependency fetch leaves the graph without edges; a failed position
/// fetch leaves no saved positions so callers fall back to auto-layout.
pub async fn load_workflow<S>(store: &S, project_id: &ProjectId, tasks: &[Task]) -> LoadedWorkflow
where
    S: DependencyStore + ?Sized,
{
    let (dependencies, positions) = tokio::join!(
        store.list_dependencies(project_id),
        store.list_positions(project_id)
    );

    let mut failures = Vec::new();

    let records = dependencies.unwrap_or_else(|e| {
        warn!("Error loading dependencies for project {}: {}", project_id, e);
        failures.push(LoadFailure::Dependencies(e));
        Vec::new()
    });

    let (graph, quarantined) = WorkflowGraph::assemble(
        tasks.iter().map(|t| t.id.clone()),
        records.into_iter().map(DependencyEdge::from),
    );
    if !quarantined.is_empty() {
        warn!(
            "Ignoring {} dependencies of project {} that reference unknown tasks",
            quarantined.len(),
            project_id
        );
    }

    let saved_positions = match positions {
        Ok(records) => records
            .into_iter()
            .filter(|r| graph.contains_node(&r.task_id))
            .map(|r| (r.task_id.clone(), r.position()))
            .collect(),
        Err(e) => {
            warn!("Error loading node positions for project {}: {}", project_id, e);
            failures.push(LoadFailure::Positions(e));
            PositionMap::new()
        }
    };

    debug!(
        "Loaded project {}: {} nodes, {} edges, {} saved positions",
        project_id,
        graph.node_count(),
        graph.edge_count(),
        saved_positions.len()
    );

    LoadedWorkflow {
        graph,
        saved_positions,
        quarantined,
        failures,
    }
}

/// Load a project's dependencies and analyze them.
///
/// Unlike [`load_workflow`], a failed dependency fetch is returned as an error
/// so that callers never mistake an unreadable project for an empty one.
pub async fn analyze_project<S>(
    store: &S,
    project_id: &ProjectId,
    tasks: &[Task],
) -> StoreResult<WorkflowAnalysis>
where
    S: DependencyStore + ?Sized,
{
    let records = store.list_dependencies(project_id).await?;
    let (graph, _) = WorkflowGraph::assemble(
        tasks.iter().map(|t| t.id.clone()),
        records.into_iter().map(DependencyEdge::from),
    );
    Ok(analyze(&graph))
}
