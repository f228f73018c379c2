//! Path extraction from a shortest-path tree.
//!
//! Routing algorithms settle nodes upward-linked through [`EdgeEntry`]
//! records: each entry names the edge used to reach `end_node` and points
//! at its parent toward the source. A [`Path`] walks that chain back to
//! the source terminator, then reconstructs the edge sequence, the node
//! sequence, the full point polyline, per-segment distances and
//! turn-by-turn instructions.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::rc::Rc;

use crate::coll::{PointList, TurnInstruction, WayList};
use crate::encode::VehicleEncoder;
use crate::error::{GraphError, Result};
use crate::model::{edge_is_valid, EdgeId, NodeId, NO_EDGE};
use crate::storage::cursor::{EdgeCursor, EdgeRead};
use crate::storage::GraphStorage;

/// One entry of a predecessor chain. The chain terminator is an entry
/// whose `edge` is not a valid edge id; its `end_node` is the source.
#[derive(Debug, Clone)]
pub struct EdgeEntry {
    pub edge: EdgeId,
    pub end_node: NodeId,
    pub weight: f64,
    pub parent: Option<Rc<EdgeEntry>>,
}

impl EdgeEntry {
    /// A chain terminator positioned on the source node.
    pub fn source(end_node: NodeId, weight: f64) -> Self {
        Self {
            edge: NO_EDGE,
            end_node,
            weight,
            parent: None,
        }
    }

    pub fn reached(edge: EdgeId, end_node: NodeId, weight: f64, parent: Rc<EdgeEntry>) -> Self {
        Self {
            edge,
            end_node,
            weight,
            parent: Some(parent),
        }
    }
}

/// A path through the graph, reconstructed from a predecessor chain.
pub struct Path<'a> {
    graph: &'a GraphStorage,
    encoder: &'a dyn VehicleEncoder,
    edge_entry: Option<Rc<EdgeEntry>>,
    edge_ids: Vec<EdgeId>,
    from_node: NodeId,
    distance: f64,
    time: u64,
    weight: f64,
    found: bool,
    cached_points: Option<PointList>,
    cached_ways: Option<WayList>,
}

impl<'a> Path<'a> {
    pub fn new(graph: &'a GraphStorage, encoder: &'a dyn VehicleEncoder) -> Self {
        Self {
            graph,
            encoder,
            edge_entry: None,
            edge_ids: Vec::new(),
            from_node: NO_EDGE,
            distance: 0.0,
            time: 0,
            weight: f64::MAX,
            found: false,
            cached_points: None,
            cached_ways: None,
        }
    }

    pub fn edge_entry(mut self, entry: Rc<EdgeEntry>) -> Self {
        self.edge_entry = Some(entry);
        self
    }

    pub fn found(&self) -> bool {
        self.found
    }

    /// Distance in meters.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Travel time in seconds.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Weight as maintained by the routing algorithm; `f64::MAX` until set.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// The first node of the path. Panics when called before a successful
    /// [`extract`](Self::extract).
    pub fn from_node(&self) -> NodeId {
        assert!(self.found, "call extract() before retrieving from_node");
        self.from_node
    }

    /// Walks the predecessor chain up to the terminator, accumulating
    /// distance and time, then reverses the edge list into source-to-goal
    /// order.
    pub fn extract(&mut self) -> Result<()> {
        let mut current = self
            .edge_entry
            .clone()
            .ok_or_else(|| GraphError::InvalidState("no edge entry to extract from".into()))?;

        while edge_is_valid(current.edge) {
            self.process_edge(current.edge, current.end_node)?;
            let parent = current.parent.clone().ok_or_else(|| {
                GraphError::Corruption("predecessor chain broken before its terminator".into())
            })?;
            current = parent;
        }

        self.from_node = current.end_node;
        self.edge_ids.reverse();
        self.found = true;
        Ok(())
    }

    fn process_edge(&mut self, edge: EdgeId, end_node: NodeId) -> Result<()> {
        let iter = self.graph.get_edge_props(edge, end_node)?;
        if iter.is_empty() {
            return Err(GraphError::Corruption(format!(
                "edge {edge} does not touch end node {end_node}"
            )));
        }
        let distance = iter.distance();
        self.distance += distance;
        self.time += (distance * 3.6 / self.encoder.speed(iter.flags())) as u64;
        self.edge_ids.push(edge);
        Ok(())
    }

    /// Restartable cursor over the path's edges in travel order. Each
    /// returned view is positioned with `end_node` on the near side, so
    /// its `base_node()` is the exit node of that leg.
    pub fn edges(&self) -> PathEdges<'_> {
        PathEdges {
            graph: self.graph,
            edge_ids: &self.edge_ids,
            index: 0,
            current_node: self.from_node,
        }
    }

    /// The tower-node indices along the path, `edge_count + 1` entries.
    pub fn calc_nodes(&self) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::with_capacity(self.edge_ids.len() + 1);
        if self.edge_ids.is_empty() {
            return Ok(nodes);
        }
        nodes.push(self.from_node());
        let mut edges = self.edges();
        while let Some(iter) = edges.next()? {
            nodes.push(iter.base_node());
        }
        Ok(nodes)
    }

    /// The full polyline of the path, pillar nodes included. Cached.
    pub fn calc_points(&mut self) -> Result<&PointList> {
        if self.cached_points.is_none() {
            let mut points = PointList::with_capacity(self.edge_ids.len() + 1);
            if !self.edge_ids.is_empty() {
                let from = self.from_node();
                points.add(self.graph.latitude(from), self.graph.longitude(from));
                let mut edges = self.edges();
                while let Some(iter) = edges.next()? {
                    // The single-edge view orients pillars toward its end
                    // node, which is the near side here; flip them into
                    // travel order.
                    let mut pillars = iter.way_geometry();
                    pillars.reverse();
                    for i in 0..pillars.size() {
                        points.add(pillars.latitude(i), pillars.longitude(i));
                    }
                    let base = iter.base_node();
                    points.add(self.graph.latitude(base), self.graph.longitude(base));
                }
            }
            self.cached_points = Some(points);
        }
        Ok(self.cached_points.as_ref().expect("points were just cached"))
    }

    /// Turn-by-turn instructions, derived from the angular difference
    /// between successive legs whenever the street name changes. Cached.
    pub fn calc_ways(&mut self) -> Result<&WayList> {
        if self.cached_ways.is_none() {
            let mut ways = WayList::with_capacity(self.edge_ids.len() / 4);
            if !self.edge_ids.is_empty() {
                self.derive_ways(&mut ways)?;
            }
            self.cached_ways = Some(ways);
        }
        Ok(self.cached_ways.as_ref().expect("ways were just cached"))
    }

    fn derive_ways(&self, ways: &mut WayList) -> Result<()> {
        let from = self.from_node();
        let mut name_ref: i32 = -1;
        let mut prev_lat = self.graph.latitude(from);
        let mut prev_lon = self.graph.longitude(from);
        let mut prev_orientation = 0.0f64;

        let mut edges = self.edges();
        while let Some(iter) = edges.next()? {
            // Three points make a direction: the node left two legs ago,
            // the node left one leg ago and the node entered now. The
            // comparison shifts the current orientation into
            // (prev - pi, prev + pi] so the turn sign survives the wrap.
            let mut orientation = 0.0f64;
            let base = iter.base_node();
            let lat = self.graph.latitude(base);
            let lon = self.graph.longitude(base);

            if name_ref == -1 {
                name_ref = iter.name_ref();
                ways.add(
                    TurnInstruction::ContinueOnStreet,
                    self.graph.get_name(name_ref)?,
                );
            } else if name_ref != iter.name_ref() {
                orientation = (lat - prev_lat).atan2(lon - prev_lon);
                if orientation < 0.0 {
                    orientation += 2.0 * PI;
                }

                let shifted = if prev_orientation >= 0.0 && orientation < prev_orientation - PI {
                    orientation + 2.0 * PI
                } else if prev_orientation < 0.0 && orientation > prev_orientation + PI {
                    orientation - 2.0 * PI
                } else {
                    orientation
                };

                // The instruction names the street being left.
                let street = self.graph.get_name(name_ref)?;
                if shifted > prev_orientation {
                    ways.add(TurnInstruction::TurnLeft, street);
                } else if shifted < prev_orientation {
                    ways.add(TurnInstruction::TurnRight, street);
                } else {
                    ways.add(TurnInstruction::ContinueOnStreet, street);
                }
                name_ref = iter.name_ref();
            }

            prev_lat = lat;
            prev_lon = lon;
            prev_orientation = orientation;
        }
        Ok(())
    }

    /// Per-edge distances in travel order.
    pub fn calc_distances(&self) -> Result<Vec<f64>> {
        let mut distances = Vec::with_capacity(self.edge_ids.len());
        if self.edge_ids.is_empty() {
            return Ok(distances);
        }
        let mut edges = self.edges();
        while let Some(iter) = edges.next()? {
            distances.push(iter.distance());
        }
        Ok(distances)
    }

    /// The set of tower nodes shared between both paths.
    pub fn calculate_identical_nodes(&self, other: &Path<'_>) -> Result<HashSet<NodeId>> {
        let own: HashSet<NodeId> = self.calc_nodes()?.into_iter().collect();
        Ok(other
            .calc_nodes()?
            .into_iter()
            .filter(|node| own.contains(node))
            .collect())
    }

    pub fn edge_ids(&self) -> &[EdgeId] {
        &self.edge_ids
    }
}

impl std::fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "distance: {}, edges: {}", self.distance, self.edge_ids.len())
    }
}

/// Cursor over a path's edges; see [`Path::edges`].
pub struct PathEdges<'a> {
    graph: &'a GraphStorage,
    edge_ids: &'a [EdgeId],
    index: usize,
    current_node: NodeId,
}

impl<'a> PathEdges<'a> {
    pub fn next(&mut self) -> Result<Option<EdgeCursor<'a>>> {
        if self.index == self.edge_ids.len() {
            return Ok(None);
        }
        let edge = self.edge_ids[self.index];
        let iter = self.graph.get_edge_props(edge, self.current_node)?;
        if iter.is_empty() {
            return Err(GraphError::Corruption(format!(
                "edge {edge} was empty when requested with node {}, index {}",
                self.current_node, self.index
            )));
        }
        self.current_node = iter.base_node();
        self.index += 1;
        Ok(Some(iter))
    }
}
