use std::collections::{BTreeSet, HashMap};

use meridian::{CarFlagEncoder, Directory, EdgeRead, GraphStorage, Storable};
use tempfile::tempdir;

fn open(path: &std::path::Path) -> GraphStorage {
    GraphStorage::new(Directory::new(path)).expect("storage")
}

fn neighbors(graph: &GraphStorage, node: i32) -> Vec<i32> {
    let mut iter = graph.get_edges(node);
    let mut result = Vec::new();
    while iter.next().expect("next") {
        result.push(iter.node());
    }
    result
}

#[test]
fn removing_the_middle_of_a_line() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    graph.set_node(0, 0.0, 0.0).expect("node");
    graph.set_node(1, 0.0, 1.0).expect("node");
    graph.set_node(2, 0.0, 2.0).expect("node");
    graph.edge_default(0, 1, 111_000.0, false, 0).expect("edge");
    graph.edge_default(1, 2, 111_000.0, false, 0).expect("edge");

    graph.mark_node_removed(1);
    assert!(graph.is_node_removed(1));
    let report = graph.optimize().expect("optimize");

    assert_eq!(graph.node_count(), 2);
    assert_eq!(report.removed_nodes, 1);
    assert_eq!(report.moved_nodes, 1);
    // Node 2 moved into slot 1; edge records stay but are unlinked.
    assert_eq!(graph.edge_count(), 2);
    assert!((graph.longitude(1) - 2.0).abs() < 1e-7);
    assert!(neighbors(&graph, 0).is_empty());
    assert!(neighbors(&graph, 1).is_empty());
    assert!(!graph.is_node_removed(1), "marker set is cleared");
}

#[test]
fn surviving_connectivity_is_preserved() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(16).expect("create");

    // Unique coordinates identify nodes across the remap.
    for node in 0..8 {
        graph.set_node(node, node as f64, -(node as f64)).expect("node");
    }
    let edges = [
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 4),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 0),
        (2, 6),
    ];
    for &(a, b) in &edges {
        graph.edge_default(a, b, 1000.0, true, 0).expect("edge");
    }

    let removed = [1, 3];
    let removed_set: BTreeSet<i32> = removed.iter().copied().collect();
    // Expected neighbor coordinates per surviving node, by coordinate.
    let mut expected: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    let coord = |graph: &GraphStorage, node: i32| graph.latitude(node).round() as i64;
    for node in 0..8 {
        if removed_set.contains(&node) {
            continue;
        }
        let set: BTreeSet<i64> = neighbors(&graph, node)
            .into_iter()
            .filter(|n| !removed_set.contains(n))
            .map(|n| coord(&graph, n))
            .collect();
        expected.insert(coord(&graph, node), set);
    }

    for &node in &removed {
        graph.mark_node_removed(node);
    }
    graph.optimize().expect("optimize");
    assert_eq!(graph.node_count(), 6);

    let mut actual: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    for node in 0..graph.node_count() {
        let set: BTreeSet<i64> = neighbors(&graph, node)
            .into_iter()
            .map(|n| coord(&graph, n))
            .collect();
        actual.insert(coord(&graph, node), set);
    }
    assert_eq!(actual, expected);
}

#[test]
fn moved_node_keeps_directed_flags() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    let encoder = CarFlagEncoder::default();
    let flags = encoder.flags(40, false);
    for node in 0..6 {
        graph.set_node(node, 0.0, node as f64).expect("node");
    }
    // One-way 2 -> 5. After removing nodes 0 and 1, node 5 moves into a
    // slot below 2 and the canonical order of the record flips.
    graph.edge(2, 5, 300.0, flags, 0).expect("edge");

    let before: Vec<i32> = {
        let mut iter = graph.get_edges(5);
        let mut flags_seen = Vec::new();
        while iter.next().expect("next") {
            flags_seen.push(iter.flags());
        }
        flags_seen
    };

    graph.mark_node_removed(0);
    graph.mark_node_removed(1);
    graph.optimize().expect("optimize");
    assert_eq!(graph.node_count(), 4);

    // Node 5 is now node 0 (first freed slot), node 4 became node 1.
    assert!((graph.longitude(0) - 5.0).abs() < 1e-7);
    let after: Vec<i32> = {
        let mut iter = graph.get_edges(0);
        let mut flags_seen = Vec::new();
        while iter.next().expect("next") {
            flags_seen.push(iter.flags());
        }
        flags_seen
    };
    assert_eq!(before, after);

    // And the edge still reads as one-way out of the old node 2.
    let mut iter = graph.get_edges(2);
    assert!(iter.next().expect("next"));
    assert_eq!(iter.node(), 0);
    assert_eq!(iter.flags(), flags);
    assert!(encoder.is_forward(iter.flags()));
}

#[test]
fn removing_trailing_nodes_moves_nothing() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    for node in 0..5 {
        graph.set_node(node, 0.0, node as f64).expect("node");
    }
    graph.edge_default(0, 1, 100.0, true, 0).expect("edge");
    graph.edge_default(1, 4, 100.0, true, 0).expect("edge");

    graph.mark_node_removed(3);
    graph.mark_node_removed(4);
    let report = graph.optimize().expect("optimize");

    assert_eq!(graph.node_count(), 3);
    assert_eq!(report.moved_nodes, 0);
    // The edge toward the removed tail is unlinked from node 1.
    assert_eq!(neighbors(&graph, 1), vec![0]);
    assert_eq!(neighbors(&graph, 0), vec![1]);
}

#[test]
fn optimize_without_markers_is_a_no_op() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");
    graph.set_node(0, 1.0, 1.0).expect("node");
    graph.set_node(1, 2.0, 2.0).expect("node");
    graph.edge_default(0, 1, 10.0, true, 0).expect("edge");

    let report = graph.optimize().expect("optimize");
    assert_eq!(report.removed_nodes, 0);
    assert_eq!(graph.node_count(), 2);
    assert_eq!(neighbors(&graph, 0), vec![1]);
}

#[test]
fn compaction_survives_persistence() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("g");

    {
        let mut graph = open(&path);
        graph.create_new(8).expect("create");
        for node in 0..4 {
            graph.set_node(node, node as f64, node as f64).expect("node");
        }
        graph.edge_default(0, 2, 100.0, true, 0).expect("edge");
        graph.edge_default(2, 3, 100.0, true, 0).expect("edge");
        graph.mark_node_removed(1);
        graph.optimize().expect("optimize");
        graph.flush().expect("flush");
        graph.close().expect("close");
    }

    let mut graph = open(&path);
    assert!(graph.load_existing().expect("load"));
    assert_eq!(graph.node_count(), 3);
    // Node 3 moved into slot 1 and kept its edge to node 2.
    assert!((graph.latitude(1) - 3.0).abs() < 1e-7);
    assert_eq!(neighbors(&graph, 1), vec![2]);
    assert_eq!(neighbors(&graph, 2), vec![0, 1]);
}
