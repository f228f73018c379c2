use meridian::{
    CarFlagEncoder, CombinedEncoder, Directory, EdgeRead, GraphStorage, PointList, Storable,
    StorageConfig,
};
use tempfile::tempdir;

fn open(path: &std::path::Path) -> GraphStorage {
    GraphStorage::new(Directory::new(path)).expect("storage")
}

fn open_mmap(path: &std::path::Path) -> GraphStorage {
    GraphStorage::new(Directory::with_config(path, StorageConfig::mmap())).expect("storage")
}

#[test]
fn empty_storage_round_trip() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("g");

    {
        let mut graph = open(&path);
        graph.create_new(0).expect("create");
        graph.flush().expect("flush");
        graph.close().expect("close");
    }

    let mut graph = open(&path);
    assert!(graph.load_existing().expect("load"));
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);
    let bounds = graph.bounds();
    assert!(
        bounds.min_lat > bounds.max_lat && bounds.min_lon > bounds.max_lon,
        "expected the inverted-empty box, got {bounds:?}"
    );
}

#[test]
fn three_node_line_adjacency_and_bounds() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    graph.set_node(0, 0.0, 0.0).expect("node 0");
    graph.set_node(1, 0.0, 1.0).expect("node 1");
    graph.set_node(2, 0.0, 2.0).expect("node 2");
    let n1 = graph.add_name("First street").expect("name");
    let n2 = graph.add_name("Second street").expect("name");
    graph.edge_default(0, 1, 111_000.0, false, n1).expect("edge 0-1");
    graph.edge_default(1, 2, 111_000.0, false, n2).expect("edge 1-2");

    // Iteration order from node 1 equals insertion order.
    let mut iter = graph.get_edges(1);
    assert!(iter.next().expect("first"));
    assert_eq!(iter.node(), 0);
    assert_eq!(iter.name_ref(), n1);
    assert!(iter.next().expect("second"));
    assert_eq!(iter.node(), 2);
    assert_eq!(iter.name_ref(), n2);
    assert!(!iter.next().expect("end"));

    let bounds = graph.bounds();
    assert_eq!(
        (bounds.min_lat, bounds.max_lat, bounds.min_lon, bounds.max_lon),
        (0.0, 0.0, 0.0, 2.0)
    );
}

#[test]
fn reverse_insertion_canonicalizes_and_swaps_flags() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    let encoder = CarFlagEncoder::default();
    let flags = encoder.flags(30, false);
    for node in 0..6 {
        graph.set_node(node, 0.0, node as f64).expect("node");
    }
    {
        let iter = graph.edge(5, 3, 10.0, flags, 0).expect("edge");
        // The returned cursor reports from the inserting side.
        assert_eq!(iter.base_node(), 5);
        assert_eq!(iter.node(), 3);
        assert_eq!(iter.flags(), flags);
    }

    // On disk the record is canonical and the flags are swapped.
    let mut all = graph.all_edges();
    assert!(all.next());
    assert_eq!(all.node_a(), 3);
    assert_eq!(all.node_b(), 5);
    assert_eq!(all.flags(), encoder.swap_direction(flags));

    let mut from_five = graph.get_edges(5);
    assert!(from_five.next().expect("next"));
    assert_eq!(from_five.flags(), flags);

    let mut from_three = graph.get_edges(3);
    assert!(from_three.next().expect("next"));
    assert_eq!(from_three.flags(), encoder.swap_direction(flags));
}

#[test]
fn flags_round_trip_both_perspectives() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    let encoder = CarFlagEncoder::default();
    let flags = encoder.flags(80, false);
    graph.set_node(0, 0.0, 0.0).expect("node");
    graph.set_node(1, 0.0, 1.0).expect("node");
    graph.edge(0, 1, 500.0, flags, 0).expect("edge");

    let mut from_a = graph.get_edges(0);
    assert!(from_a.next().expect("next"));
    assert_eq!(from_a.flags(), flags);

    let mut from_b = graph.get_edges(1);
    assert!(from_b.next().expect("next"));
    assert_eq!(from_b.flags(), encoder.swap_direction(flags));
}

#[test]
fn rewriting_flags_through_a_cursor() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    let encoder = CarFlagEncoder::default();
    graph.set_node(0, 0.0, 0.0).expect("node");
    graph.set_node(1, 0.0, 1.0).expect("node");
    graph
        .edge(0, 1, 500.0, encoder.flags(30, true), 0)
        .expect("edge");

    let new_flags = encoder.flags(70, false);
    {
        let mut iter = graph.get_edges_mut(1);
        assert!(iter.next().expect("next"));
        iter.set_flags(new_flags);
        assert_eq!(iter.flags(), new_flags);
        assert_eq!(iter.distance(), 500.0);
    }

    // From node 1 the new flags come back unchanged, from node 0 swapped.
    let mut from_b = graph.get_edges(1);
    assert!(from_b.next().expect("next"));
    assert_eq!(from_b.flags(), new_flags);

    let mut from_a = graph.get_edges(0);
    assert!(from_a.next().expect("next"));
    assert_eq!(from_a.flags(), encoder.swap_direction(new_flags));
}

#[test]
fn geometry_is_oriented_along_the_traversal() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    graph.set_node(0, 0.0, 0.0).expect("node");
    graph.set_node(1, 0.0, 0.3).expect("node");
    let mut pillars = PointList::new();
    pillars.add(0.0, 0.1);
    pillars.add(0.0, 0.2);
    {
        let mut iter = graph.edge_default(0, 1, 33_000.0, true, 0).expect("edge");
        iter.set_way_geometry(&pillars).expect("geometry");
    }

    let mut from_a = graph.get_edges(0);
    assert!(from_a.next().expect("next"));
    let forward = from_a.way_geometry();
    assert_eq!(forward.size(), 2);
    assert!((forward.longitude(0) - 0.1).abs() < 1e-6);
    assert!((forward.longitude(1) - 0.2).abs() < 1e-6);

    let mut from_b = graph.get_edges(1);
    assert!(from_b.next().expect("next"));
    let backward = from_b.way_geometry();
    assert!((backward.longitude(0) - 0.2).abs() < 1e-6);
    assert!((backward.longitude(1) - 0.1).abs() < 1e-6);
}

#[test]
fn geometry_set_against_canonical_order_is_stored_canonically() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    graph.set_node(0, 0.0, 0.0).expect("node");
    graph.set_node(1, 0.0, 0.3).expect("node");
    // Insert from the descending side; the pillar list is given in the
    // 1 -> 0 direction of travel.
    let mut pillars = PointList::new();
    pillars.add(0.0, 0.2);
    pillars.add(0.0, 0.1);
    {
        let mut iter = graph.edge_default(1, 0, 33_000.0, true, 0).expect("edge");
        iter.set_way_geometry(&pillars).expect("geometry");
    }

    let mut from_a = graph.get_edges(0);
    assert!(from_a.next().expect("next"));
    let forward = from_a.way_geometry();
    assert!((forward.longitude(0) - 0.1).abs() < 1e-6);
    assert!((forward.longitude(1) - 0.2).abs() < 1e-6);
}

#[test]
fn self_loop_appears_once() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    graph.set_node(0, 1.0, 1.0).expect("node");
    graph.edge_default(0, 0, 10.0, true, 0).expect("loop");
    graph.set_node(1, 1.0, 2.0).expect("node");
    graph.edge_default(0, 1, 10.0, true, 0).expect("edge");

    let mut seen = Vec::new();
    let mut iter = graph.get_edges(0);
    while iter.next().expect("next") {
        seen.push((iter.edge(), iter.node()));
    }
    assert_eq!(seen, vec![(0, 0), (1, 1)]);
}

#[test]
fn name_dedup_through_the_storage() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(4).expect("create");

    let main = graph.add_name("Main").expect("add");
    let oak = graph.add_name("Oak").expect("add");
    assert_ne!(main, oak);
    assert_eq!(graph.add_name("Main").expect("re-add"), main);
    assert_eq!(graph.get_name(main).expect("get"), "Main");
    assert_eq!(graph.get_name(oak).expect("get"), "Oak");
}

#[test]
fn persistence_round_trip_preserves_everything() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("g");
    let encoder = CarFlagEncoder::default();
    let flags = encoder.flags(60, false);

    {
        let mut graph = open(&path);
        graph.create_new(8).expect("create");
        graph.set_node(0, 48.1, 11.5).expect("node");
        graph.set_node(1, 48.2, 11.6).expect("node");
        graph.set_node(2, 48.3, 11.4).expect("node");
        let name = graph.add_name("Ringstraße").expect("name");
        graph.edge(0, 1, 1234.5, flags, name).expect("edge");
        let mut pillars = PointList::new();
        pillars.add(48.15, 11.55);
        {
            let mut iter = graph.edge(2, 1, 777.0, flags, name).expect("edge");
            iter.set_way_geometry(&pillars).expect("geometry");
        }
        graph.flush().expect("flush");
        graph.close().expect("close");
    }

    let mut graph = open(&path);
    assert!(graph.load_existing().expect("load"));
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!((graph.latitude(0) - 48.1).abs() < 1e-7);
    assert!((graph.longitude(2) - 11.4).abs() < 1e-7);

    let bounds = graph.bounds();
    assert!((bounds.min_lat - 48.1).abs() < 1e-7);
    assert!((bounds.max_lat - 48.3).abs() < 1e-7);
    assert!((bounds.min_lon - 11.4).abs() < 1e-7);
    assert!((bounds.max_lon - 11.6).abs() < 1e-7);

    let name = {
        let mut iter = graph.get_edges(0);
        assert!(iter.next().expect("next"));
        assert_eq!(iter.node(), 1);
        assert_eq!(iter.flags(), flags);
        assert!((iter.distance() - 1234.5).abs() < 0.001);
        iter.name_ref()
    };
    assert_eq!(graph.get_name(name).expect("name"), "Ringstraße");

    // The second edge was inserted as 2 -> 1; its geometry must still be
    // oriented along the traversal.
    let mut iter = graph.get_edges(2);
    assert!(iter.next().expect("next"));
    assert_eq!(iter.node(), 1);
    assert_eq!(iter.flags(), flags);
    let pillars = iter.way_geometry();
    assert_eq!(pillars.size(), 1);
    assert!((pillars.latitude(0) - 48.15).abs() < 1e-7);
}

#[test]
fn mmap_backing_round_trip() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("g");

    {
        let mut graph = open_mmap(&path);
        graph.create_new(8).expect("create");
        for node in 0..50 {
            graph
                .set_node(node, node as f64 * 0.01, -(node as f64) * 0.01)
                .expect("node");
        }
        for node in 0..49 {
            graph
                .edge_default(node, node + 1, 100.0, true, 0)
                .expect("edge");
        }
        graph.flush().expect("flush");
        graph.close().expect("close");
    }

    // A RAM-backed reopen reads the very same files.
    let mut graph = open(&path);
    assert!(graph.load_existing().expect("load"));
    assert_eq!(graph.node_count(), 50);
    assert_eq!(graph.edge_count(), 49);
    let mut iter = graph.get_edges(25);
    let mut neighbors = Vec::new();
    while iter.next().expect("next") {
        neighbors.push(iter.node());
    }
    assert_eq!(neighbors, vec![24, 26]);
}

#[test]
fn missing_sibling_file_fails_the_load() {
    let tmp = tempdir().expect("temp dir");
    let path = tmp.path().join("g");

    {
        let mut graph = open(&path);
        graph.create_new(4).expect("create");
        graph.set_node(0, 1.0, 1.0).expect("node");
        graph.flush().expect("flush");
        graph.close().expect("close");
    }
    std::fs::remove_file(path.join("names")).expect("drop names file");

    let mut graph = open(&path);
    assert!(matches!(
        graph.load_existing(),
        Err(meridian::GraphError::Corruption(_))
    ));
}

#[test]
fn load_of_empty_directory_returns_false() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    assert!(!graph.load_existing().expect("load"));
}

#[test]
fn filtered_iteration_skips_rejected_edges() {
    use meridian::EdgeFilter;

    struct OnlyForward(CarFlagEncoder);
    impl EdgeFilter for OnlyForward {
        fn accept(&self, edge: &dyn EdgeRead) -> bool {
            self.0.is_forward(edge.flags())
        }
    }

    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    let encoder = CarFlagEncoder::default();
    for node in 0..4 {
        graph.set_node(node, 0.0, node as f64).expect("node");
    }
    // 0 -> 1 one-way away from 0, 2 -> 0 one-way toward 0, 0 - 3 both.
    graph.edge(0, 1, 10.0, encoder.flags(50, false), 0).expect("edge");
    graph.edge(2, 0, 10.0, encoder.flags(50, false), 0).expect("edge");
    graph.edge(0, 3, 10.0, encoder.flags(50, true), 0).expect("edge");

    let filter = OnlyForward(encoder);
    let mut iter = graph.get_edges_filtered(0, &filter);
    let mut reachable = Vec::new();
    while iter.next().expect("next") {
        reachable.push(iter.node());
    }
    assert_eq!(reachable, vec![1, 3]);
}

#[test]
fn get_edge_props_views_and_sentinel() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.create_new(8).expect("create");

    let encoder = CarFlagEncoder::default();
    let flags = encoder.flags(90, false);
    for node in 0..4 {
        graph.set_node(node, 0.0, node as f64).expect("node");
    }
    graph.edge(1, 2, 42.0, flags, 0).expect("edge");

    let into_b = graph.get_edge_props(0, 2).expect("view");
    assert!(!into_b.is_empty());
    assert_eq!(into_b.base_node(), 1);
    assert_eq!(into_b.node(), 2);
    assert_eq!(into_b.flags(), flags);

    let into_a = graph.get_edge_props(0, 1).expect("view");
    assert_eq!(into_a.base_node(), 2);
    assert_eq!(into_a.node(), 1);
    assert_eq!(into_a.flags(), encoder.swap_direction(flags));

    let neither = graph.get_edge_props(0, 3).expect("sentinel");
    assert!(neither.is_empty());

    assert!(graph.get_edge_props(5, 1).is_err());
    assert!(graph.get_edge_props(0, 17).is_err());
}

#[test]
fn copy_to_clones_the_graph() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("src"));
    graph.create_new(4).expect("create");
    graph.set_node(0, 1.0, 2.0).expect("node");
    graph.set_node(1, 3.0, 4.0).expect("node");
    let name = graph.add_name("Kopierstraße").expect("name");
    graph.edge_default(0, 1, 250.0, true, name).expect("edge");

    let mut clone = open(&tmp.path().join("dst"));
    graph.copy_to(&mut clone).expect("copy");

    assert_eq!(clone.node_count(), 2);
    assert_eq!(clone.edge_count(), 1);
    assert!((clone.latitude(1) - 3.0).abs() < 1e-7);
    let mut iter = clone.get_edges(0);
    assert!(iter.next().expect("next"));
    assert_eq!(iter.node(), 1);
    assert_eq!(clone.get_name(iter.name_ref()).expect("name"), "Kopierstraße");
}

#[test]
fn growth_over_many_nodes_and_edges() {
    let tmp = tempdir().expect("temp dir");
    let mut graph = open(&tmp.path().join("g"));
    graph.set_segment_size(256).expect("segment size");
    graph.create_new(1).expect("create");

    for node in 0..500 {
        graph
            .set_node(node, node as f64 * 1e-4, node as f64 * 1e-4)
            .expect("node");
    }
    for node in 1..500 {
        graph.edge_default(node - 1, node, 15.0, true, 0).expect("edge");
    }
    assert_eq!(graph.node_count(), 500);
    assert_eq!(graph.edge_count(), 499);

    // Interior nodes see both neighbors despite many segment growths.
    let mut iter = graph.get_edges(250);
    let mut neighbors = Vec::new();
    while iter.next().expect("next") {
        neighbors.push(iter.node());
    }
    assert_eq!(neighbors, vec![249, 251]);
}
