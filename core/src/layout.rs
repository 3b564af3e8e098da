/// Layout engine: longest-path depth levels turned into grid positions.
///
/// Depth of a node is the length of the longest path reaching it from an
/// entry point (see [`Adjacency::entry_points`]). Edges that lead back into
/// the node currently being expanded or any of its ancestors on the traversal
/// path are skipped, so cyclic graphs still terminate with finite depths.
use crate::config::LayoutConfig;
use crate::graph::{Adjacency, WorkflowGraph};
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Position in 2D space for the workflow canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// Position of every node, keyed by task
pub type PositionMap = BTreeMap<TaskId, Position>;

/// Depth assignment for every node of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Levels {
    depths: HashMap<TaskId, usize>,
    groups: Vec<Vec<TaskId>>,
}

impl Levels {
    /// Depth of a node, if it belongs to the graph
    pub fn depth(&self, id: &TaskId) -> Option<usize> {
        self.depths.get(id).copied()
    }

    /// Nodes grouped by depth, ascending; members follow task-list order
    pub fn groups(&self) -> &[Vec<TaskId>] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<Vec<TaskId>> {
        self.groups
    }

    /// Deepest level, or `None` for an empty graph
    pub fn max_depth(&self) -> Option<usize> {
        self.depths.values().copied().max()
    }

    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}

/// Assign every node its longest-path depth.
pub fn assign_levels(adj: &Adjacency) -> Levels {
    let n = adj.len();
    let mut depths: Vec<Option<usize>> = vec![None; n];
    let mut on_path = vec![false; n];

    for entry in adj.entry_points() {
        if depths[entry].is_none() {
            depths[entry] = Some(0);
        }
        propagate(adj, entry, &mut depths, &mut on_path);
    }

    // entry_points reaches every node, so nothing is left unassigned
    let depths: Vec<usize> = depths.into_iter().map(|d| d.unwrap_or(0)).collect();

    let level_count = depths.iter().copied().max().map_or(0, |max| max + 1);
    let mut groups: Vec<Vec<TaskId>> = vec![Vec::new(); level_count];
    for (i, &depth) in depths.iter().enumerate() {
        groups[depth].push(adj.node(i).clone());
    }
    groups.retain(|g| !g.is_empty());

    Levels {
        depths: depths
            .into_iter()
            .enumerate()
            .map(|(i, d)| (adj.node(i).clone(), d))
            .collect(),
        groups,
    }
}

/// Push improved depths from `start` through its successors.
///
/// A successor is re-expanded only when its depth strictly improves and it is
/// not already on the current path. Depths are bounded by simple-path length,
/// so every node improves a bounded number of times.
fn propagate(adj: &Adjacency, start: usize, depths: &mut [Option<usize>], on_path: &mut [bool]) {
    // (node, index of the next successor to visit)
    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    on_path[start] = true;

    while let Some(frame) = stack.last_mut() {
        let (node, cursor) = *frame;
        match adj.successors(node).get(cursor) {
            Some(&child) => {
                frame.1 += 1;
                if on_path[child] {
                    continue;
                }
                let proposed = depths[node].unwrap_or(0) + 1;
                if depths[child].map_or(true, |current| proposed > current) {
                    depths[child] = Some(proposed);
                    on_path[child] = true;
                    stack.push((child, 0));
                }
            }
            None => {
                on_path[node] = false;
                stack.pop();
            }
        }
    }
}

/// Result of a layout run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub levels: Levels,
    pub positions: PositionMap,
}

/// Computes positions for a workflow graph
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Compute a full replacement position map for all nodes
    pub fn run(&self, graph: &WorkflowGraph) -> Layout {
        let levels = assign_levels(&graph.adjacency());
        let positions = self.place(&levels);
        debug!(
            "Laid out {} nodes across {} levels",
            positions.len(),
            levels.groups().len()
        );
        Layout { levels, positions }
    }

    /// Turn levels into grid coordinates
    pub fn place(&self, levels: &Levels) -> PositionMap {
        let mut positions = PositionMap::new();
        for group in levels.groups() {
            for (row, id) in group.iter().enumerate() {
                let depth = levels.depth(id).unwrap_or(0);
                positions.insert(
                    id.clone(),
                    Position::new(
                        self.config.base_x + depth as f64 * self.config.level_spacing,
                        self.config.base_y + row as f64 * self.config.node_spacing,
                    ),
                );
            }
        }
        positions
    }
}
