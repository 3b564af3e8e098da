/// Interactive workflow editor controller
///
/// Owns one project's graph, positions and analysis while a user edits them,
/// and mediates every mutation:
///
/// - drawing a connection opens a pending draft whose kind defaults from the
///   handle it was drawn from; confirming commits it, cancelling drops it
/// - structural changes re-run layout and analysis
/// - dragging a node only moves that node
/// - saving replaces the project's dependencies, then upserts all positions
///
/// Saving and reloading are split into `begin_*` / `finish_*` halves carrying a
/// ticket, so a host UI can run the store calls off its event loop; at most
/// one of them is in flight at a time.
use crate::analysis::{analyze_with_levels, statistics, WorkflowAnalysis, WorkflowStatistics};
use crate::errors::{EditorError, EditorResult, LoadFailure, StoreResult};
use crate::graph::{DependencyEdge, EdgeKind, WorkflowGraph};
use crate::layout::{assign_levels, LayoutEngine, Position, PositionMap};
use crate::loader::{load_workflow, LoadedWorkflow};
use crate::store::{DependencyRecord, DependencyStore, PositionRecord};
use crate::task::{ProjectId, Task, TaskId, TaskPriority, TaskStatus, UNKNOWN_TASK_LABEL};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

// ============================================================================
// Connection handles
// ============================================================================

/// Source handle for success connections
pub const SUCCESS_HANDLE: &str = "source-success";

/// Source handle for conditional connections
pub const CONDITIONAL_HANDLE: &str = "source-conditional";

/// The single target handle of a node
pub const TARGET_HANDLE: &str = "target-default";

/// Source handle a connection was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionHandle {
    Success,
    Conditional,
}

impl ConnectionHandle {
    pub fn id(&self) -> &'static str {
        match self {
            ConnectionHandle::Success => SUCCESS_HANDLE,
            ConnectionHandle::Conditional => CONDITIONAL_HANDLE,
        }
    }

    /// Edge kind a draft starts with
    pub fn default_kind(&self) -> EdgeKind {
        match self {
            ConnectionHandle::Success => EdgeKind::Success,
            ConnectionHandle::Conditional => EdgeKind::Conditional,
        }
    }
}

impl FromStr for ConnectionHandle {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SUCCESS_HANDLE => Ok(ConnectionHandle::Success),
            CONDITIONAL_HANDLE => Ok(ConnectionHandle::Conditional),
            other => Err(EditorError::UnknownHandle(other.to_string())),
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Externally visible editor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorState {
    /// A reload is in flight
    Loading,
    /// Matches the last persisted state
    Loaded,
    /// A drawn connection awaits confirmation
    PendingConnection,
    /// Differs from the last persisted state
    Dirty,
    /// A save is in flight
    Saving,
}

impl fmt::Display for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EditorState::Loading => "loading",
            EditorState::Loaded => "loaded",
            EditorState::PendingConnection => "pending-connection",
            EditorState::Dirty => "dirty",
            EditorState::Saving => "saving",
        };
        f.write_str(label)
    }
}

/// A connection awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDraft {
    pub source: TaskId,
    pub target: TaskId,
    pub kind: EdgeKind,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    edges: Vec<DependencyEdge>,
    positions: PositionMap,
}

impl Snapshot {
    fn matches(&self, graph: &WorkflowGraph, positions: &PositionMap) -> bool {
        if self.positions != *positions || self.edges.len() != graph.edge_count() {
            return false;
        }
        let saved: HashSet<&DependencyEdge> = self.edges.iter().collect();
        graph.edges().iter().all(|e| saved.contains(e))
    }
}

/// Read-only summary of one node for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub task_id: TaskId,
    pub name: String,
    pub description: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub position: Position,
    pub critical: bool,
    pub bottleneck: bool,
    /// False when a search is active and the task does not match it
    pub matched: bool,
}

// ============================================================================
// Save and reload protocol
// ============================================================================

/// Everything one save writes, captured when the save starts
#[derive(Debug, Clone)]
pub struct SaveRequest {
    ticket: u64,
    pub project_id: ProjectId,
    pub dependencies: Vec<DependencyRecord>,
    pub positions: Vec<PositionRecord>,
    snapshot: Snapshot,
}

impl SaveRequest {
    /// Replace dependencies, then upsert positions. Both are attempted.
    pub async fn execute<S>(&self, store: &S) -> SaveOutcome
    where
        S: DependencyStore + ?Sized,
    {
        let dependencies = store
            .replace_dependencies(&self.project_id, &self.dependencies)
            .await;
        let positions = store.upsert_positions(&self.positions).await;
        SaveOutcome {
            dependencies,
            positions,
        }
    }
}

/// Results of the two writes of a save
#[derive(Debug)]
pub struct SaveOutcome {
    pub dependencies: StoreResult<()>,
    pub positions: StoreResult<()>,
}

/// Summary of a committed save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// Dependencies in the graph; quarantined rows are not counted
    pub dependency_count: usize,
    pub positions_saved: bool,
}

impl SaveReport {
    /// User-facing confirmation
    pub fn message(&self) -> String {
        if self.dependency_count == 0 {
            "Task workflow has been updated with no dependencies.".to_string()
        } else {
            format!(
                "Task workflow saved with {} task dependencies.",
                self.dependency_count
            )
        }
    }
}

/// Token identifying one reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket(u64);

// ============================================================================
// Controller
// ============================================================================

pub struct WorkflowEditor {
    project_id: ProjectId,
    tasks: Vec<Task>,
    graph: WorkflowGraph,
    positions: PositionMap,
    analysis: WorkflowAnalysis,
    engine: LayoutEngine,
    draft: Option<EdgeDraft>,
    search: String,
    persisted: Snapshot,
    quarantined: Vec<DependencyEdge>,
    load_failures: Vec<LoadFailure>,
    saving: Option<u64>,
    loading: Option<u64>,
    next_ticket: u64,
}

impl WorkflowEditor {
    /// Editor over a loaded workflow
    pub fn new(
        project_id: ProjectId,
        tasks: Vec<Task>,
        loaded: LoadedWorkflow,
        engine: LayoutEngine,
    ) -> Self {
        let mut editor = WorkflowEditor {
            project_id,
            tasks: Vec::new(),
            graph: WorkflowGraph::default(),
            positions: PositionMap::new(),
            analysis: WorkflowAnalysis::default(),
            engine,
            draft: None,
            search: String::new(),
            persisted: Snapshot::default(),
            quarantined: Vec::new(),
            load_failures: Vec::new(),
            saving: None,
            loading: None,
            next_ticket: 0,
        };
        editor.apply_loaded(tasks, loaded);
        editor
    }

    /// Load a project from `store` and open an editor on it
    pub async fn load<S>(
        store: &S,
        project_id: ProjectId,
        tasks: Vec<Task>,
        engine: LayoutEngine,
    ) -> Self
    where
        S: DependencyStore + ?Sized,
    {
        let loaded = load_workflow(store, &project_id, &tasks).await;
        Self::new(project_id, tasks, loaded, engine)
    }

    fn apply_loaded(&mut self, tasks: Vec<Task>, loaded: LoadedWorkflow) {
        let LoadedWorkflow {
            graph,
            saved_positions,
            quarantined,
            failures,
        } = loaded;

        self.tasks = tasks;
        self.graph = graph;
        self.refresh();

        // Saved positions win; tasks without one keep their computed place
        for (id, position) in saved_positions {
            if self.graph.contains_node(&id) {
                self.positions.insert(id, position);
            }
        }

        self.persisted = Snapshot {
            edges: self.graph.edges().to_vec(),
            positions: self.positions.clone(),
        };
        self.quarantined = quarantined;
        self.load_failures = failures;
        self.draft = None;
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Re-run layout and analysis after a structural change
    fn refresh(&mut self) {
        let adj = self.graph.adjacency();
        let levels = assign_levels(&adj);
        self.positions = self.engine.place(&levels);
        self.analysis = analyze_with_levels(&adj, levels);
    }

    fn require_task(&self, id: &TaskId) -> EditorResult<()> {
        if self.graph.contains_node(id) {
            Ok(())
        } else {
            Err(EditorError::UnknownTask(id.clone()))
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    pub fn analysis(&self) -> &WorkflowAnalysis {
        &self.analysis
    }

    pub fn statistics(&self) -> WorkflowStatistics {
        statistics(&self.graph, self.quarantined.len())
    }

    pub fn draft(&self) -> Option<&EdgeDraft> {
        self.draft.as_ref()
    }

    /// Persisted edges ignored at load because an endpoint is not a known task
    pub fn quarantined(&self) -> &[DependencyEdge] {
        &self.quarantined
    }

    /// Non-fatal failures from the last load
    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    pub fn is_dirty(&self) -> bool {
        !self.persisted.matches(&self.graph, &self.positions)
    }

    pub fn state(&self) -> EditorState {
        if self.saving.is_some() {
            EditorState::Saving
        } else if self.loading.is_some() {
            EditorState::Loading
        } else if self.draft.is_some() {
            EditorState::PendingConnection
        } else if self.is_dirty() {
            EditorState::Dirty
        } else {
            EditorState::Loaded
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Start a connection drawn from `handle` of `source` onto `target`
    pub fn begin_connection(
        &mut self,
        source: TaskId,
        target: TaskId,
        handle: ConnectionHandle,
    ) -> EditorResult<&EdgeDraft> {
        if let Some(draft) = &self.draft {
            return Err(EditorError::ConnectionPending(draft.source.clone()));
        }
        self.require_task(&source)?;
        self.require_task(&target)?;
        if source == target {
            return Err(EditorError::SelfDependency(source));
        }

        let kind = handle.default_kind();
        let condition = match kind {
            EdgeKind::Conditional => self
                .graph
                .edge(&source, &target)
                .and_then(|e| e.condition.clone())
                .unwrap_or_default(),
            EdgeKind::Success => String::new(),
        };

        debug!("Pending {} connection {} -> {}", kind.label(), source, target);
        Ok(self.draft.insert(EdgeDraft {
            source,
            target,
            kind,
            condition,
        }))
    }

    /// Change the kind of the pending connection
    pub fn set_draft_kind(&mut self, kind: EdgeKind) -> EditorResult<()> {
        let draft = self.draft.as_mut().ok_or(EditorError::NoPendingConnection)?;
        draft.kind = kind;
        if kind == EdgeKind::Success {
            draft.condition.clear();
        }
        Ok(())
    }

    /// Edit the condition text of a pending conditional connection
    pub fn set_draft_condition(&mut self, condition: impl Into<String>) -> EditorResult<()> {
        let draft = self.draft.as_mut().ok_or(EditorError::NoPendingConnection)?;
        if draft.kind != EdgeKind::Conditional {
            return Err(EditorError::ConditionNotEditable);
        }
        draft.condition = condition.into();
        Ok(())
    }

    /// Commit the pending connection.
    ///
    /// A conditional draft with blank condition text is refused and stays pending.
    pub fn confirm_connection(&mut self) -> EditorResult<DependencyEdge> {
        let draft = self.draft.as_ref().ok_or(EditorError::NoPendingConnection)?;
        if draft.kind == EdgeKind::Conditional && draft.condition.trim().is_empty() {
            return Err(EditorError::MissingCondition(
                draft.source.clone(),
                draft.target.clone(),
            ));
        }

        let Some(draft) = self.draft.take() else {
            return Err(EditorError::NoPendingConnection);
        };
        let replaced = self.graph.add_edge(
            draft.source.clone(),
            draft.target.clone(),
            draft.kind,
            Some(draft.condition),
        );
        if replaced.is_some() {
            debug!("Replaced dependency {} -> {}", draft.source, draft.target);
        }
        self.refresh();

        let committed = self.graph.edge(&draft.source, &draft.target).cloned();
        committed.ok_or(EditorError::UnknownTask(draft.target))
    }

    /// Drop the pending connection; the graph is untouched
    pub fn cancel_connection(&mut self) -> Option<EdgeDraft> {
        self.draft.take()
    }

    /// Draw and immediately commit a connection
    pub fn connect(
        &mut self,
        source: TaskId,
        target: TaskId,
        kind: EdgeKind,
        condition: Option<String>,
    ) -> EditorResult<DependencyEdge> {
        let handle = match kind {
            EdgeKind::Success => ConnectionHandle::Success,
            EdgeKind::Conditional => ConnectionHandle::Conditional,
        };
        self.begin_connection(source, target, handle)?;
        if let Some(condition) = condition.filter(|_| kind == EdgeKind::Conditional) {
            self.set_draft_condition(condition)?;
        }
        self.confirm_connection().map_err(|e| {
            self.draft = None;
            e
        })
    }

    /// Remove a dependency. Returns whether one existed.
    pub fn remove_dependency(&mut self, source: &TaskId, target: &TaskId) -> bool {
        let removed = self.graph.remove_edge(source, target).is_some();
        if removed {
            self.refresh();
        }
        removed
    }

    /// Remove every dependency
    pub fn clear_dependencies(&mut self) {
        self.graph.remove_all_edges();
        self.refresh();
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    /// Manually place one node
    pub fn move_node(&mut self, id: &TaskId, position: Position) -> EditorResult<()> {
        self.require_task(id)?;
        self.positions.insert(id.clone(), position);
        Ok(())
    }

    /// Discard manual placement and lay the graph out again
    pub fn reset_layout(&mut self) {
        self.positions = self.engine.run(&self.graph).positions;
    }

    /// Discard all unsaved edits
    pub fn revert(&mut self) {
        self.draft = None;
        self.graph.replace_edges(self.persisted.edges.clone());
        self.refresh();
        self.positions = self.persisted.positions.clone();
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Filter presentation by a case-insensitive substring of name or description.
    /// An empty query shows everything; the graph is never affected.
    pub fn set_search(&mut self, query: &str) {
        self.search = query.to_lowercase();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn matches_search(&self, id: &TaskId) -> bool {
        if self.search.is_empty() {
            return true;
        }
        self.task(id)
            .map(|t| t.matches_lowercase(&self.search))
            .unwrap_or(false)
    }

    /// Tasks passing the current search, in task-list order
    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| self.matches_search(&t.id))
            .collect()
    }

    /// One summary per node, in task-list order
    pub fn node_views(&self) -> Vec<NodeView> {
        self.graph
            .nodes()
            .iter()
            .map(|id| {
                let task = self.task(id);
                NodeView {
                    task_id: id.clone(),
                    name: task
                        .map(|t| t.name.clone())
                        .unwrap_or_else(|| UNKNOWN_TASK_LABEL.to_string()),
                    description: task
                        .map(Task::description_preview)
                        .unwrap_or_else(|| "No description".to_string()),
                    status: task.map(|t| t.status),
                    priority: task.map(|t| t.priority),
                    position: self.positions.get(id).copied().unwrap_or_default(),
                    critical: self.analysis.is_critical(id),
                    bottleneck: self.analysis.is_bottleneck(id),
                    matched: self.matches_search(id),
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Capture the current edges and positions for saving
    pub fn begin_save(&mut self) -> EditorResult<SaveRequest> {
        if self.saving.is_some() {
            return Err(EditorError::SaveInProgress);
        }
        if self.loading.is_some() {
            return Err(EditorError::LoadInProgress);
        }
        if self
            .load_failures
            .iter()
            .any(|f| matches!(f, LoadFailure::Dependencies(_)))
        {
            warn!(
                "Saving project {} although its dependencies failed to load",
                self.project_id
            );
        }

        let ticket = self.take_ticket();
        self.saving = Some(ticket);

        let snapshot = Snapshot {
            edges: self.graph.edges().to_vec(),
            positions: self.positions.clone(),
        };
        Ok(SaveRequest {
            ticket,
            project_id: self.project_id.clone(),
            // Quarantined rows go back unchanged
            dependencies: snapshot
                .edges
                .iter()
                .chain(self.quarantined.iter())
                .map(DependencyRecord::from)
                .collect(),
            positions: snapshot
                .positions
                .iter()
                .map(|(id, pos)| PositionRecord::new(self.project_id.clone(), id.clone(), *pos))
                .collect(),
            snapshot,
        })
    }

    /// Record the outcome of a save started by [`begin_save`](Self::begin_save).
    ///
    /// A failed dependency write leaves the editor dirty and returns the error;
    /// a failed position write is only logged.
    pub fn finish_save(
        &mut self,
        request: SaveRequest,
        outcome: SaveOutcome,
    ) -> EditorResult<SaveReport> {
        if self.saving != Some(request.ticket) {
            return Err(EditorError::NoSaveInProgress);
        }
        self.saving = None;

        if let Err(e) = outcome.dependencies {
            error!("Error saving workflow for project {}: {}", self.project_id, e);
            return Err(EditorError::SaveFailed(e));
        }

        let positions_saved = match outcome.positions {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Error saving node positions for project {}: {}",
                    self.project_id, e
                );
                false
            }
        };

        let report = SaveReport {
            dependency_count: request.snapshot.edges.len(),
            positions_saved,
        };
        self.persisted = request.snapshot;
        info!("{} (project {})", report.message(), self.project_id);
        Ok(report)
    }

    /// Save through `store`
    pub async fn save<S>(&mut self, store: &S) -> EditorResult<SaveReport>
    where
        S: DependencyStore + ?Sized,
    {
        let request = self.begin_save()?;
        let outcome = request.execute(store).await;
        self.finish_save(request, outcome)
    }

    // ------------------------------------------------------------------
    // Reloading
    // ------------------------------------------------------------------

    /// Start reloading from the store
    pub fn begin_reload(&mut self) -> EditorResult<ReloadTicket> {
        if self.saving.is_some() {
            return Err(EditorError::SaveInProgress);
        }
        let ticket = self.take_ticket();
        self.loading = Some(ticket);
        Ok(ReloadTicket(ticket))
    }

    /// Apply a reload result. Results of superseded reloads are ignored;
    /// returns whether this one was applied.
    pub fn finish_reload(
        &mut self,
        ticket: ReloadTicket,
        tasks: Vec<Task>,
        loaded: LoadedWorkflow,
    ) -> bool {
        if self.loading != Some(ticket.0) {
            debug!("Discarding stale reload for project {}", self.project_id);
            return false;
        }
        self.loading = None;
        self.apply_loaded(tasks, loaded);
        true
    }

    /// Reload from `store`, discarding unsaved edits
    pub async fn reload<S>(&mut self, store: &S, tasks: Vec<Task>) -> EditorResult<()>
    where
        S: DependencyStore + ?Sized,
    {
        let ticket = self.begin_reload()?;
        let loaded = load_workflow(store, &self.project_id, &tasks).await;
        self.finish_reload(ticket, tasks, loaded);
        Ok(())
    }
}
