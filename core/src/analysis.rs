/// Workflow analyzer: critical path, parallelizable groups and bottlenecks.
use crate::graph::{Adjacency, WorkflowGraph};
use crate::layout::{assign_levels, Levels};
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scheduling insights derived from a workflow graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAnalysis {
    /// Longest entry-to-leaf chain of dependencies
    pub critical_path: Vec<TaskId>,

    /// Nodes sharing a depth level; no edge runs inside a group on acyclic graphs
    pub parallel_groups: Vec<Vec<TaskId>>,

    /// Nodes with more than one distinct predecessor and more than one distinct successor
    pub bottlenecks: Vec<TaskId>,
}

impl WorkflowAnalysis {
    pub fn is_critical(&self, id: &TaskId) -> bool {
        self.critical_path.contains(id)
    }

    pub fn is_bottleneck(&self, id: &TaskId) -> bool {
        self.bottlenecks.contains(id)
    }
}

/// Counters for status displays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub conditional_edge_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub quarantined_edge_count: usize,
}

/// Analyze a graph. The same graph always yields the same analysis.
pub fn analyze(graph: &WorkflowGraph) -> WorkflowAnalysis {
    let adj = graph.adjacency();
    let levels = assign_levels(&adj);
    analyze_with_levels(&adj, levels)
}

/// Analyze using levels already computed for the same adjacency
pub fn analyze_with_levels(adj: &Adjacency, levels: Levels) -> WorkflowAnalysis {
    let analysis = WorkflowAnalysis {
        critical_path: critical_path(adj),
        parallel_groups: levels.into_groups(),
        bottlenecks: bottlenecks(adj),
    };
    debug!(
        "Analysis: critical path {} nodes, {} groups, {} bottlenecks",
        analysis.critical_path.len(),
        analysis.parallel_groups.len(),
        analysis.bottlenecks.len()
    );
    analysis
}

/// Longest simple path by node count, starting from an entry point.
///
/// Entry points are tried in order and a later one only wins when strictly
/// longer; among successors, the first in edge insertion order wins ties.
pub fn critical_path(adj: &Adjacency) -> Vec<TaskId> {
    let mut search = LongestPath::new(adj);
    let mut best: Vec<usize> = Vec::new();

    for entry in adj.entry_points() {
        let path = search.path_from(entry);
        if path.len() > best.len() {
            best = path;
        }
    }

    best.into_iter().rev().map(|i| adj.node(i).clone()).collect()
}

/// Longest-simple-path search.
///
/// From a node that cannot reach any cycle, the best path never depends on
/// which nodes are already on the traversal path, so `len[n]` / `next[n]` are
/// memoized for those. Nodes that can reach a cycle are searched exhaustively
/// over simple paths, so no longer path is missed.
struct LongestPath<'a> {
    adj: &'a Adjacency,
    reaches_cycle: Vec<bool>,
    len: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    on_path: Vec<bool>,
}

impl<'a> LongestPath<'a> {
    fn new(adj: &'a Adjacency) -> Self {
        let n = adj.len();
        Self {
            adj,
            reaches_cycle: reaches_cycle(adj),
            len: vec![None; n],
            next: vec![None; n],
            on_path: vec![false; n],
        }
    }

    /// Best path from `start`, leaf first
    fn path_from(&mut self, start: usize) -> Vec<usize> {
        if !self.reaches_cycle[start] {
            self.memoized(start);
            let mut path = Vec::new();
            let mut current = Some(start);
            while let Some(node) = current {
                path.push(node);
                current = self.next[node];
            }
            path.reverse();
            return path;
        }

        let adj = self.adj;
        self.on_path[start] = true;
        let mut best: Vec<usize> = Vec::new();
        for &child in adj.successors(start) {
            if self.on_path[child] {
                continue;
            }
            let tail = self.path_from(child);
            if tail.len() > best.len() {
                best = tail;
            }
        }
        self.on_path[start] = false;

        best.push(start);
        best
    }

    /// Fill `len` / `next` for every node reachable from an acyclic `start`
    fn memoized(&mut self, start: usize) {
        if self.len[start].is_some() {
            return;
        }

        // (node, next successor index, best length so far, best successor)
        let mut stack: Vec<(usize, usize, usize, Option<usize>)> = vec![(start, 0, 1, None)];

        while let Some(frame) = stack.last_mut() {
            let (node, cursor, _, _) = *frame;
            match self.adj.successors(node).get(cursor) {
                Some(&child) => {
                    frame.1 += 1;
                    match self.len[child] {
                        Some(child_len) => {
                            if child_len + 1 > frame.2 {
                                frame.2 = child_len + 1;
                                frame.3 = Some(child);
                            }
                        }
                        None => stack.push((child, 0, 1, None)),
                    }
                }
                None => {
                    let (node, _, best_len, best_next) = *frame;
                    stack.pop();
                    self.len[node] = Some(best_len);
                    self.next[node] = best_next;

                    if let Some(parent) = stack.last_mut() {
                        if best_len + 1 > parent.2 {
                            parent.2 = best_len + 1;
                            parent.3 = Some(node);
                        }
                    }
                }
            }
        }
    }
}

/// Nodes that lie on a cycle or can reach one
fn reaches_cycle(adj: &Adjacency) -> Vec<bool> {
    let n = adj.len();
    let mut marked = vec![false; n];

    // A node is on a cycle when one of its successors reaches it again
    let mut stack = Vec::new();
    for node in 0..n {
        let mut seen = vec![false; n];
        stack.clear();
        stack.extend_from_slice(adj.successors(node));
        while let Some(i) = stack.pop() {
            if i == node {
                marked[node] = true;
                break;
            }
            if !seen[i] {
                seen[i] = true;
                stack.extend_from_slice(adj.successors(i));
            }
        }
    }

    // Everything upstream of a cycle reaches it
    let mut stack: Vec<usize> = (0..n).filter(|&i| marked[i]).collect();
    while let Some(i) = stack.pop() {
        for &pred in adj.predecessors(i) {
            if !marked[pred] {
                marked[pred] = true;
                stack.push(pred);
            }
        }
    }
    marked
}

/// Nodes with in-degree > 1 and out-degree > 1, in task-list order
pub fn bottlenecks(adj: &Adjacency) -> Vec<TaskId> {
    (0..adj.len())
        .filter(|&i| adj.in_degree(i) > 1 && adj.out_degree(i) > 1)
        .map(|i| adj.node(i).clone())
        .collect()
}

/// Counters for a graph; `quarantined` is the number of edges dropped at load
pub fn statistics(graph: &WorkflowGraph, quarantined: usize) -> WorkflowStatistics {
    let adj = graph.adjacency();
    let levels = assign_levels(&adj);
    WorkflowStatistics {
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        conditional_edge_count: graph
            .edges()
            .iter()
            .filter(|e| e.condition.is_some())
            .count(),
        root_count: adj.roots().len(),
        leaf_count: adj.leaves().len(),
        max_depth: levels.max_depth().unwrap_or(0),
        quarantined_edge_count: quarantined,
    }
}
