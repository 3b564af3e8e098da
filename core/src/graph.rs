/// Workflow graph model
///
/// Nodes are the tasks of one project, kept in task-list order. Edges are
/// dependencies "target cannot start until source is done", at most one per
/// ordered (source, target) pair, kept in insertion order. The model itself
/// does not validate edges; cycles are tolerated and endpoint validation
/// happens when a graph is assembled from persisted records.
///
/// # Examples
///
/// ```rust
/// use trellis_core::graph::{EdgeKind, WorkflowGraph};
/// use trellis_core::task::TaskId;
///
/// let mut graph = WorkflowGraph::new(["T1", "T2", "T3"].map(TaskId::from));
/// graph.add_edge("T1".into(), "T2".into(), EdgeKind::Success, None);
/// graph.add_edge("T2".into(), "T3".into(), EdgeKind::Conditional, Some("inspection passed".into()));
///
/// assert_eq!(graph.edge_count(), 2);
/// assert_eq!(graph.adjacency().roots().len(), 1);
/// ```
use crate::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Target may start once the source is done
    #[default]
    Success,

    /// Target may start once the source is done and the condition holds
    Conditional,
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Success => "success",
            EdgeKind::Conditional => "conditional",
        }
    }
}

/// A directed dependency between two tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawDependencyEdge")]
pub struct DependencyEdge {
    pub source: TaskId,
    pub target: TaskId,
    /// Free-text condition; present and non-empty exactly when the edge is conditional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DependencyEdge {
    /// Create an edge. Blank conditions are dropped, making the edge a success edge.
    pub fn new(source: TaskId, target: TaskId, condition: Option<String>) -> Self {
        DependencyEdge {
            source,
            target,
            condition: normalize_condition(condition),
        }
    }

    pub fn success(source: TaskId, target: TaskId) -> Self {
        Self::new(source, target, None)
    }

    pub fn conditional(source: TaskId, target: TaskId, condition: impl Into<String>) -> Self {
        Self::new(source, target, Some(condition.into()))
    }

    /// Kind derived from the condition text
    pub fn kind(&self) -> EdgeKind {
        if self.condition.is_some() {
            EdgeKind::Conditional
        } else {
            EdgeKind::Success
        }
    }

    /// Stable identifier used by presentation layers
    pub fn id(&self) -> String {
        format!("e-{}-{}", self.source, self.target)
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    fn key(&self) -> (TaskId, TaskId) {
        (self.source.clone(), self.target.clone())
    }
}

/// Wire form of an edge; deserialization goes through [`DependencyEdge::new`]
#[derive(Deserialize)]
struct RawDependencyEdge {
    source: TaskId,
    target: TaskId,
    #[serde(default)]
    condition: Option<String>,
}

impl From<RawDependencyEdge> for DependencyEdge {
    fn from(raw: RawDependencyEdge) -> Self {
        DependencyEdge::new(raw.source, raw.target, raw.condition)
    }
}

fn normalize_condition(condition: Option<String>) -> Option<String> {
    condition.and_then(|c| {
        let trimmed = c.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Dependency graph of one project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowGraph {
    nodes: Vec<TaskId>,
    node_index: HashMap<TaskId, usize>,
    edges: Vec<DependencyEdge>,
    edge_index: HashMap<(TaskId, TaskId), usize>,
}

impl WorkflowGraph {
    /// Create a graph over the given nodes. Duplicate ids keep their first position.
    pub fn new(nodes: impl IntoIterator<Item = TaskId>) -> Self {
        let mut graph = WorkflowGraph::default();
        for id in nodes {
            if !graph.node_index.contains_key(&id) {
                graph.node_index.insert(id.clone(), graph.nodes.len());
                graph.nodes.push(id);
            }
        }
        graph
    }

    /// Create a graph whose nodes are the given tasks, in list order
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self::new(tasks.iter().map(|t| t.id.clone()))
    }

    /// Assemble a graph from persisted edges, quarantining any edge whose
    /// endpoints are not both nodes of the graph.
    ///
    /// Returns the graph and the rejected edges, in input order.
    pub fn assemble(
        nodes: impl IntoIterator<Item = TaskId>,
        edges: impl IntoIterator<Item = DependencyEdge>,
    ) -> (Self, Vec<DependencyEdge>) {
        let mut graph = Self::new(nodes);
        let mut quarantined = Vec::new();

        for edge in edges {
            if graph.contains_node(&edge.source) && graph.contains_node(&edge.target) {
                graph.insert_edge(edge);
            } else {
                debug!(
                    "Quarantining dependency {} -> {} with unknown endpoint",
                    edge.source, edge.target
                );
                quarantined.push(edge);
            }
        }

        (graph, quarantined)
    }

    /// Insert or replace the edge for (source, target).
    ///
    /// A `Success` kind drops any condition text. Returns the replaced edge, if any.
    pub fn add_edge(
        &mut self,
        source: TaskId,
        target: TaskId,
        kind: EdgeKind,
        condition: Option<String>,
    ) -> Option<DependencyEdge> {
        let condition = match kind {
            EdgeKind::Success => None,
            EdgeKind::Conditional => condition,
        };
        self.insert_edge(DependencyEdge::new(source, target, condition))
    }

    /// Insert or replace an edge keyed by its (source, target) pair.
    /// A replaced edge keeps its original insertion position.
    pub fn insert_edge(&mut self, edge: DependencyEdge) -> Option<DependencyEdge> {
        let key = edge.key();
        match self.edge_index.get(&key) {
            Some(&slot) => Some(std::mem::replace(&mut self.edges[slot], edge)),
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(edge);
                None
            }
        }
    }

    /// Remove the edge for (source, target), if present
    pub fn remove_edge(&mut self, source: &TaskId, target: &TaskId) -> Option<DependencyEdge> {
        let slot = self
            .edge_index
            .remove(&(source.clone(), target.clone()))?;
        let removed = self.edges.remove(slot);
        self.reindex_edges();
        Some(removed)
    }

    /// Remove every edge, keeping the nodes
    pub fn remove_all_edges(&mut self) {
        self.edges.clear();
        self.edge_index.clear();
    }

    /// Replace the whole edge set
    pub fn replace_edges(&mut self, edges: impl IntoIterator<Item = DependencyEdge>) {
        self.remove_all_edges();
        for edge in edges {
            self.insert_edge(edge);
        }
    }

    fn reindex_edges(&mut self) {
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key(), i))
            .collect();
    }

    pub fn nodes(&self) -> &[TaskId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &TaskId) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn has_edge(&self, source: &TaskId, target: &TaskId) -> bool {
        self.edge(source, target).is_some()
    }

    pub fn edge(&self, source: &TaskId, target: &TaskId) -> Option<&DependencyEdge> {
        self.edge_index
            .get(&(source.clone(), target.clone()))
            .map(|&slot| &self.edges[slot])
    }

    /// Direct successors of a node, in edge insertion order
    pub fn successors(&self, id: &TaskId) -> Vec<&TaskId> {
        self.edges
            .iter()
            .filter(|e| &e.source == id)
            .map(|e| &e.target)
            .collect()
    }

    /// Direct predecessors of a node, in edge insertion order
    pub fn predecessors(&self, id: &TaskId) -> Vec<&TaskId> {
        self.edges
            .iter()
            .filter(|e| &e.target == id)
            .map(|e| &e.source)
            .collect()
    }

    /// Build the traversal view used by layout and analysis
    pub fn adjacency(&self) -> Adjacency {
        Adjacency::build(self)
    }
}

/// Index-based adjacency over the nodes of a [`WorkflowGraph`].
///
/// Only edges between two known, distinct nodes take part; anything else is
/// left out of traversal. Successor and predecessor lists follow edge
/// insertion order, and node indices follow task-list order.
#[derive(Debug, Clone)]
pub struct Adjacency {
    nodes: Vec<TaskId>,
    forward: Vec<Vec<usize>>,
    reverse: Vec<Vec<usize>>,
}

impl Adjacency {
    fn build(graph: &WorkflowGraph) -> Self {
        let n = graph.nodes.len();
        let mut forward = vec![Vec::new(); n];
        let mut reverse = vec![Vec::new(); n];

        for edge in &graph.edges {
            let (Some(&s), Some(&t)) = (
                graph.node_index.get(&edge.source),
                graph.node_index.get(&edge.target),
            ) else {
                debug!(
                    "Skipping dependency {} -> {}: endpoint is not a task of this workflow",
                    edge.source, edge.target
                );
                continue;
            };
            if s == t {
                debug!("Skipping self-dependency on {}", edge.source);
                continue;
            }
            forward[s].push(t);
            reverse[t].push(s);
        }

        Adjacency {
            nodes: graph.nodes.clone(),
            forward,
            reverse,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &TaskId {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[TaskId] {
        &self.nodes
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.forward[index]
    }

    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.reverse[index]
    }

    pub fn in_degree(&self, index: usize) -> usize {
        self.reverse[index].len()
    }

    pub fn out_degree(&self, index: usize) -> usize {
        self.forward[index].len()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.iter().map(Vec::len).sum()
    }

    /// Nodes with no incoming edges, in task-list order
    pub fn roots(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.in_degree(i) == 0).collect()
    }

    /// Nodes with no outgoing edges, in task-list order
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.out_degree(i) == 0).collect()
    }

    /// Starting points for traversal: every root in task-list order, followed
    /// by one seed per component that no earlier entry point reaches (a
    /// component made only of cycles has no root). Seeds are picked as the
    /// first unreached node in task-list order.
    pub fn entry_points(&self) -> Vec<usize> {
        let mut reached = vec![false; self.len()];
        let mut entries = Vec::new();

        for root in self.roots() {
            self.mark_reachable(root, &mut reached);
            entries.push(root);
        }

        for i in 0..self.len() {
            if !reached[i] {
                self.mark_reachable(i, &mut reached);
                entries.push(i);
            }
        }

        entries
    }

    fn mark_reachable(&self, start: usize, reached: &mut [bool]) {
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            if reached[i] {
                continue;
            }
            reached[i] = true;
            stack.extend(self.forward[i].iter().copied().filter(|&j| !reached[j]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<TaskId> {
        names.iter().map(|n| TaskId::from(*n)).collect()
    }

    #[test]
    fn test_kind_is_derived_from_condition() {
        let edge = DependencyEdge::new("A".into(), "B".into(), Some("  ".to_string()));
        assert_eq!(edge.kind(), EdgeKind::Success);
        assert!(edge.condition.is_none());

        let edge = DependencyEdge::conditional("A".into(), "B".into(), " permit issued ");
        assert_eq!(edge.kind(), EdgeKind::Conditional);
        assert_eq!(edge.condition.as_deref(), Some("permit issued"));
        assert_eq!(edge.id(), "e-A-B");
    }

    #[test]
    fn test_deserialized_blank_condition_is_success() {
        let edge: DependencyEdge =
            serde_json::from_str(r#"{"source": "A", "target": "B", "condition": " "}"#).unwrap();
        assert_eq!(edge.kind(), EdgeKind::Success);
        assert!(edge.condition.is_none());

        let edge: DependencyEdge =
            serde_json::from_str(r#"{"source": "A", "target": "B", "condition": " rebar checked "}"#)
                .unwrap();
        assert_eq!(edge.kind(), EdgeKind::Conditional);
        assert_eq!(edge.condition.as_deref(), Some("rebar checked"));
    }

    #[test]
    fn test_add_edge_replaces_same_pair() {
        let mut graph = WorkflowGraph::new(ids(&["A", "B", "C"]));
        assert!(graph
            .add_edge("A".into(), "B".into(), EdgeKind::Success, None)
            .is_none());
        graph.add_edge("B".into(), "C".into(), EdgeKind::Success, None);

        let replaced = graph.add_edge(
            "A".into(),
            "B".into(),
            EdgeKind::Conditional,
            Some("weather clear".to_string()),
        );
        assert!(replaced.is_some());
        assert_eq!(graph.edge_count(), 2);

        // Replacement keeps the original slot
        assert_eq!(graph.edges()[0].kind(), EdgeKind::Conditional);
        assert_eq!(graph.edges()[1].source, TaskId::from("B"));
    }

    #[test]
    fn test_success_kind_drops_condition() {
        let mut graph = WorkflowGraph::new(ids(&["A", "B"]));
        graph.add_edge(
            "A".into(),
            "B".into(),
            EdgeKind::Success,
            Some("ignored".to_string()),
        );
        assert!(graph.edges()[0].condition.is_none());
    }

    #[test]
    fn test_remove_edge_reindexes() {
        let mut graph = WorkflowGraph::new(ids(&["A", "B", "C"]));
        graph.insert_edge(DependencyEdge::success("A".into(), "B".into()));
        graph.insert_edge(DependencyEdge::success("B".into(), "C".into()));

        let removed = graph.remove_edge(&"A".into(), &"B".into());
        assert!(removed.is_some());
        assert!(graph.has_edge(&"B".into(), &"C".into()));
        assert!(graph.remove_edge(&"A".into(), &"B".into()).is_none());

        graph.remove_all_edges();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_assemble_quarantines_unknown_endpoints() {
        let (graph, quarantined) = WorkflowGraph::assemble(
            ids(&["A", "B"]),
            vec![
                DependencyEdge::success("A".into(), "B".into()),
                DependencyEdge::success("A".into(), "Z".into()),
            ],
        );
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].target, TaskId::from("Z"));
    }

    #[test]
    fn test_adjacency_ignores_unknown_and_self_edges() {
        let mut graph = WorkflowGraph::new(ids(&["A", "B"]));
        graph.insert_edge(DependencyEdge::success("A".into(), "B".into()));
        graph.insert_edge(DependencyEdge::success("A".into(), "Ghost".into()));
        graph.insert_edge(DependencyEdge::success("B".into(), "B".into()));

        let adj = graph.adjacency();
        assert_eq!(adj.edge_count(), 1);
        assert_eq!(adj.roots(), vec![0]);
        assert_eq!(adj.leaves(), vec![1]);
    }

    #[test]
    fn test_entry_points_seed_rootless_cycles() {
        // A <-> B is rootless; C is a plain root
        let mut graph = WorkflowGraph::new(ids(&["A", "B", "C"]));
        graph.insert_edge(DependencyEdge::success("A".into(), "B".into()));
        graph.insert_edge(DependencyEdge::success("B".into(), "A".into()));

        let adj = graph.adjacency();
        assert_eq!(adj.roots(), vec![2]);
        assert_eq!(adj.entry_points(), vec![2, 0]);
    }

    #[test]
    fn test_successors_follow_insertion_order() {
        let mut graph = WorkflowGraph::new(ids(&["A", "B", "C"]));
        graph.insert_edge(DependencyEdge::success("A".into(), "C".into()));
        graph.insert_edge(DependencyEdge::success("A".into(), "B".into()));

        let succ = graph.successors(&"A".into());
        assert_eq!(succ, vec![&TaskId::from("C"), &TaskId::from("B")]);
        assert_eq!(graph.predecessors(&"B".into()), vec![&TaskId::from("A")]);
    }
}
