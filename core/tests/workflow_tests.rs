/// Integration tests for layout, analysis and persistence of workflow graphs
///
/// Covers:
/// - Reference scenarios (chain, diamond, conditional round trip, isolated node, cycle)
/// - Layout and analysis properties over seeded pseudo-random graphs
/// - Determinism of repeated analysis
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use trellis_core::{
    analyze, assign_levels, DependencyEdge, DependencyStore, EdgeKind, LayoutEngine, ProjectId,
    SqliteDependencyStore, Task, TaskId, WorkflowEditor, WorkflowGraph,
};

fn ids(names: &[&str]) -> Vec<TaskId> {
    names.iter().map(|n| TaskId::from(*n)).collect()
}

fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
    let mut g = WorkflowGraph::new(ids(nodes));
    for (s, t) in edges {
        g.add_edge((*s).into(), (*t).into(), EdgeKind::Success, None);
    }
    g
}

fn depths(g: &WorkflowGraph) -> HashMap<TaskId, usize> {
    let levels = assign_levels(&g.adjacency());
    g.nodes()
        .iter()
        .map(|id| (id.clone(), levels.depth(id).expect("every node has a depth")))
        .collect()
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_linear_chain() {
    let g = graph(&["T1", "T2", "T3"], &[("T1", "T2"), ("T2", "T3")]);
    let d = depths(&g);
    assert_eq!(d[&TaskId::from("T1")], 0);
    assert_eq!(d[&TaskId::from("T2")], 1);
    assert_eq!(d[&TaskId::from("T3")], 2);

    let analysis = analyze(&g);
    assert_eq!(analysis.critical_path, ids(&["T1", "T2", "T3"]));
    assert_eq!(
        analysis.parallel_groups,
        vec![ids(&["T1"]), ids(&["T2"]), ids(&["T3"])]
    );
    assert!(analysis.bottlenecks.is_empty());
}

#[test]
fn test_diamond() {
    let g = graph(
        &["T1", "T2", "T3", "T4"],
        &[("T1", "T2"), ("T1", "T3"), ("T2", "T4"), ("T3", "T4")],
    );
    let d = depths(&g);
    assert_eq!(d[&TaskId::from("T2")], 1);
    assert_eq!(d[&TaskId::from("T3")], 1);
    assert_eq!(d[&TaskId::from("T4")], 2);

    let analysis = analyze(&g);
    assert_eq!(
        analysis.parallel_groups,
        vec![ids(&["T1"]), ids(&["T2", "T3"]), ids(&["T4"])]
    );
    assert!(analysis.bottlenecks.is_empty());
    // Ties go to the successor whose edge was inserted first
    assert_eq!(analysis.critical_path, ids(&["T1", "T2", "T4"]));
}

#[tokio::test]
async fn test_conditional_classification_survives_round_trip() {
    let store = SqliteDependencyStore::in_memory().await.unwrap();
    store.initialize().await.unwrap();
    let project = ProjectId::from("tower-b");
    let tasks = vec![
        Task::new("T1", "Rebar inspection"),
        Task::new("T2", "Concrete pour"),
        Task::new("T3", "Curing"),
    ];

    let mut editor =
        WorkflowEditor::load(&store, project.clone(), tasks.clone(), LayoutEngine::default())
            .await;
    editor
        .connect(
            "T1".into(),
            "T2".into(),
            EdgeKind::Conditional,
            Some("inspector signs off".to_string()),
        )
        .unwrap();
    editor
        .connect("T2".into(), "T3".into(), EdgeKind::Success, None)
        .unwrap();
    editor.save(&store).await.unwrap();

    let records = store.list_dependencies(&project).await.unwrap();
    assert_eq!(records.len(), 2);

    let reopened = WorkflowEditor::load(&store, project, tasks, LayoutEngine::default()).await;
    let first = reopened
        .graph()
        .edge(&"T1".into(), &"T2".into())
        .expect("conditional edge reloaded");
    assert_eq!(first.kind(), EdgeKind::Conditional);
    assert_eq!(first.condition.as_deref(), Some("inspector signs off"));

    let second = reopened.graph().edge(&"T2".into(), &"T3".into()).unwrap();
    assert_eq!(second.kind(), EdgeKind::Success);
}

#[test]
fn test_disconnected_node_is_its_own_group() {
    let g = graph(&["T1", "T2", "Lone"], &[("T1", "T2")]);
    let d = depths(&g);
    assert_eq!(d[&TaskId::from("Lone")], 0);

    let g = graph(&["Lone"], &[]);
    assert_eq!(analyze(&g).parallel_groups, vec![ids(&["Lone"])]);
}

#[test]
fn test_cycle_layout_terminates() {
    let g = graph(&["T1", "T2", "T3"], &[("T1", "T2"), ("T2", "T1"), ("T2", "T3")]);
    let d = depths(&g);
    assert_eq!(d[&TaskId::from("T1")], 0);
    assert_eq!(d[&TaskId::from("T2")], 1);
    assert_eq!(d[&TaskId::from("T3")], 2);

    let layout = LayoutEngine::default().run(&g);
    assert_eq!(layout.positions.len(), 3);
    assert!(layout.positions.values().all(|p| p.x.is_finite() && p.y.is_finite()));
}

#[test]
fn test_edges_to_unknown_tasks_are_excluded() {
    let (g, quarantined) = WorkflowGraph::assemble(
        ids(&["A", "B"]),
        vec![
            DependencyEdge::success("A".into(), "B".into()),
            DependencyEdge::success("Gone".into(), "A".into()),
        ],
    );
    assert_eq!(quarantined.len(), 1);
    assert_eq!(analyze(&g).critical_path, ids(&["A", "B"]));
}

// ============================================================================
// Properties over generated graphs
// ============================================================================

fn random_graph(rng: &mut StdRng, acyclic: bool) -> WorkflowGraph {
    let n = rng.gen_range(1..=9);
    let names: Vec<TaskId> = (0..n).map(|i| TaskId::new(format!("N{}", i))).collect();
    let mut g = WorkflowGraph::new(names.clone());

    // Acyclic graphs only point forward along a shuffled order
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let rank: HashMap<usize, usize> = order.iter().enumerate().map(|(r, &i)| (i, r)).collect();

    for s in 0..n {
        for t in 0..n {
            if s == t || (acyclic && rank[&s] >= rank[&t]) {
                continue;
            }
            if rng.gen_bool(0.3) {
                g.add_edge(names[s].clone(), names[t].clone(), EdgeKind::Success, None);
            }
        }
    }
    g
}

fn reaches(g: &WorkflowGraph, from: &TaskId, to: &TaskId) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from.clone()];
    while let Some(node) = stack.pop() {
        if &node == to {
            return true;
        }
        if seen.insert(node.clone()) {
            stack.extend(g.successors(&node).into_iter().cloned());
        }
    }
    false
}

/// Node count of the longest simple path starting at `start`, by exhaustive search
fn longest_from(g: &WorkflowGraph, start: &TaskId) -> usize {
    fn walk(g: &WorkflowGraph, node: &TaskId, seen: &mut Vec<TaskId>) -> usize {
        seen.push(node.clone());
        let mut best = 0;
        for next in g.successors(node) {
            if !seen.contains(next) {
                best = best.max(walk(g, next, seen));
            }
        }
        seen.pop();
        best + 1
    }
    walk(g, start, &mut Vec::new())
}

/// Node count of the longest simple path starting at any root
fn brute_force_longest(g: &WorkflowGraph) -> usize {
    g.nodes()
        .iter()
        .filter(|id| g.predecessors(id).is_empty())
        .map(|root| longest_from(g, root))
        .max()
        .unwrap_or(0)
}

#[test]
fn test_depth_respects_every_acyclic_edge() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let g = random_graph(&mut rng, true);
        let d = depths(&g);
        assert_eq!(d.len(), g.node_count());
        for edge in g.edges() {
            assert!(
                d[&edge.target] >= d[&edge.source] + 1,
                "edge {} violates depth order",
                edge.id()
            );
        }
    }
}

#[test]
fn test_depth_respects_edges_outside_cycles() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let g = random_graph(&mut rng, false);
        let d = depths(&g);
        assert_eq!(d.len(), g.node_count());
        assert!(d.values().all(|&depth| depth < g.node_count()));

        for edge in g.edges() {
            if reaches(&g, &edge.target, &edge.source) {
                continue;
            }
            assert!(
                d[&edge.target] >= d[&edge.source] + 1,
                "edge {} outside any cycle violates depth order",
                edge.id()
            );
        }
    }
}

#[test]
fn test_parallel_groups_partition_nodes() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..200 {
        let g = random_graph(&mut rng, true);
        let groups = analyze(&g).parallel_groups;

        let mut seen: Vec<TaskId> = groups.iter().flatten().cloned().collect();
        assert_eq!(seen.len(), g.node_count());
        seen.sort();
        let mut all = g.nodes().to_vec();
        all.sort();
        assert_eq!(seen, all);

        for group in &groups {
            let members: HashSet<&TaskId> = group.iter().collect();
            assert!(g
                .edges()
                .iter()
                .all(|e| !(members.contains(&e.source) && members.contains(&e.target))));
        }
    }
}

#[test]
fn test_critical_path_is_a_simple_existing_path() {
    let mut rng = StdRng::seed_from_u64(31);
    for round in 0..400 {
        let g = random_graph(&mut rng, round % 2 == 0);
        let path = analyze(&g).critical_path;
        assert!(!path.is_empty());

        let unique: HashSet<&TaskId> = path.iter().collect();
        assert_eq!(unique.len(), path.len(), "path repeats a node");
        for pair in path.windows(2) {
            assert!(g.has_edge(&pair[0], &pair[1]));
        }
    }
}

#[test]
fn test_critical_path_is_longest_on_acyclic_graphs() {
    let mut rng = StdRng::seed_from_u64(43);
    for _ in 0..300 {
        let g = random_graph(&mut rng, true);
        let path = analyze(&g).critical_path;

        assert!(g.predecessors(&path[0]).is_empty(), "path starts at a root");
        assert!(
            g.successors(&path[path.len() - 1]).is_empty(),
            "path ends at a leaf"
        );
        assert_eq!(path.len(), brute_force_longest(&g));
    }
}

#[test]
fn test_critical_path_is_longest_on_cyclic_graphs() {
    let mut rng = StdRng::seed_from_u64(47);
    for _ in 0..300 {
        let g = random_graph(&mut rng, false);
        let path = analyze(&g).critical_path;

        // Nothing from a root is longer, and the path is the longest from its own start
        assert!(path.len() >= brute_force_longest(&g));
        assert_eq!(path.len(), longest_from(&g, &path[0]));
    }
}

#[test]
fn test_entering_cycle_late_can_be_longer() {
    let g = graph(
        &["R", "A", "B", "C1", "C2", "C3", "R2"],
        &[
            ("R", "A"),
            ("A", "B"),
            ("B", "A"),
            ("A", "C1"),
            ("C1", "C2"),
            ("C2", "C3"),
            ("R2", "B"),
        ],
    );
    let path = analyze(&g).critical_path;
    assert_eq!(path, ids(&["R2", "B", "A", "C1", "C2", "C3"]));
    assert_eq!(path.len(), brute_force_longest(&g));
}

#[test]
fn test_analysis_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(59);
    for round in 0..100 {
        let g = random_graph(&mut rng, round % 3 != 0);
        assert_eq!(analyze(&g), analyze(&g));

        let engine = LayoutEngine::default();
        assert_eq!(engine.run(&g).positions, engine.run(&g).positions);
    }
}
