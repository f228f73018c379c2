//! Edge cursors: short-lived borrows over the storage.
//!
//! All cursors report an edge oriented `base_node -> node`; stored flags
//! and pillar polylines are re-oriented on the fly whenever that traversal
//! runs against the canonical `node_a -> node_b` direction.

use crate::coll::PointList;
use crate::encode::EdgeFilter;
use crate::error::{GraphError, Result};
use crate::model::{edge_is_valid, EdgeId, NodeId, NO_EDGE};

use super::{GraphStorage, E_FLAGS, E_NAME};

/// Ceiling for one `next()` call; road-network nodes do not have a
/// thousand incident edges, so hitting it means a corrupt chain.
const MAX_CHAIN_HOPS: u32 = 1_000;

/// Read access to the edge a cursor is positioned on.
pub trait EdgeRead {
    fn edge(&self) -> EdgeId;
    /// The node this cursor iterates from (or, for single-edge views, the
    /// endpoint opposite to the requested one).
    fn base_node(&self) -> NodeId;
    /// The other endpoint, seen from `base_node`.
    fn node(&self) -> NodeId;
    /// Flags oriented along `base_node -> node`.
    fn flags(&self) -> i32;
    fn distance(&self) -> f64;
    /// Offset of the street name in the name table.
    fn name_ref(&self) -> i32;
    /// Pillar polyline oriented along `base_node -> node`.
    fn way_geometry(&self) -> PointList;
    fn is_empty(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Chain,
    Single,
    Empty,
}

/// Shared-borrow cursor over an adjacency chain or a single edge.
pub struct EdgeCursor<'a> {
    storage: &'a GraphStorage,
    filter: Option<&'a dyn EdgeFilter>,
    mode: Mode,
    base_node: NodeId,
    node: NodeId,
    edge_id: EdgeId,
    edge_pointer: u64,
    next_edge: EdgeId,
    flags: i32,
}

impl<'a> EdgeCursor<'a> {
    pub(crate) fn chain(
        storage: &'a GraphStorage,
        head: EdgeId,
        base_node: NodeId,
        filter: Option<&'a dyn EdgeFilter>,
    ) -> Self {
        Self {
            storage,
            filter,
            mode: Mode::Chain,
            base_node,
            node: -1,
            edge_id: head,
            edge_pointer: 0,
            next_edge: head,
            flags: 0,
        }
    }

    pub(crate) fn single(
        storage: &'a GraphStorage,
        edge: EdgeId,
        base_node: NodeId,
        node: NodeId,
    ) -> Self {
        let edge_pointer = storage.edge_pointer(edge);
        let mut flags = storage.edges.get_int(edge_pointer + E_FLAGS);
        if base_node > node {
            flags = storage.encoder.swap_direction(flags);
        }
        Self {
            storage,
            filter: None,
            mode: Mode::Single,
            base_node,
            node,
            edge_id: edge,
            edge_pointer,
            next_edge: NO_EDGE,
            flags,
        }
    }

    pub(crate) fn empty(storage: &'a GraphStorage) -> Self {
        Self {
            storage,
            filter: None,
            mode: Mode::Empty,
            base_node: -1,
            node: -1,
            edge_id: NO_EDGE,
            edge_pointer: 0,
            next_edge: NO_EDGE,
            flags: 0,
        }
    }

    /// Advances to the next accepted edge. Single-edge and empty cursors
    /// always report exhaustion.
    pub fn next(&mut self) -> Result<bool> {
        if self.mode != Mode::Chain {
            return Ok(false);
        }
        for _ in 0..MAX_CHAIN_HOPS {
            if !edge_is_valid(self.next_edge) {
                return Ok(false);
            }
            if self.read_next()? {
                return Ok(true);
            }
        }
        Err(GraphError::Corruption(format!(
            "no end of the edge list of node {} found",
            self.base_node
        )))
    }

    fn read_next(&mut self) -> Result<bool> {
        self.edge_pointer = self.storage.edge_pointer(self.next_edge);
        self.edge_id = self.next_edge;
        self.node = self.storage.get_other_node(self.base_node, self.edge_pointer);

        self.next_edge = self
            .storage
            .edges
            .get_int(self.storage.link_pos(self.base_node, self.node, self.edge_pointer));
        if self.next_edge == self.edge_id {
            return Err(GraphError::Corruption(format!(
                "endless loop detected for base node {}, node {}",
                self.base_node, self.node
            )));
        }

        self.flags = self.storage.edges.get_int(self.edge_pointer + E_FLAGS);
        if self.base_node > self.node {
            self.flags = self.storage.encoder.swap_direction(self.flags);
        }

        let filter = self.filter;
        Ok(match filter {
            Some(f) => f.accept(&*self),
            None => true,
        })
    }
}

impl EdgeRead for EdgeCursor<'_> {
    fn edge(&self) -> EdgeId {
        self.edge_id
    }

    fn base_node(&self) -> NodeId {
        self.base_node
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn flags(&self) -> i32 {
        self.flags
    }

    fn distance(&self) -> f64 {
        self.storage.edge_distance(self.edge_pointer)
    }

    fn name_ref(&self) -> i32 {
        self.storage.edges.get_int(self.edge_pointer + E_NAME)
    }

    fn way_geometry(&self) -> PointList {
        self.storage
            .read_way_geometry(self.edge_pointer, self.base_node > self.node)
    }

    fn is_empty(&self) -> bool {
        self.mode == Mode::Empty
    }
}

/// Exclusive-borrow cursor with in-place mutation of the current edge.
pub struct EdgeCursorMut<'a> {
    storage: &'a mut GraphStorage,
    base_node: NodeId,
    node: NodeId,
    edge_id: EdgeId,
    edge_pointer: u64,
    next_edge: EdgeId,
    flags: i32,
}

impl<'a> EdgeCursorMut<'a> {
    pub(crate) fn chain(storage: &'a mut GraphStorage, head: EdgeId, base_node: NodeId) -> Self {
        Self {
            storage,
            base_node,
            node: -1,
            edge_id: head,
            edge_pointer: 0,
            next_edge: head,
            flags: 0,
        }
    }

    pub fn next(&mut self) -> Result<bool> {
        if !edge_is_valid(self.next_edge) {
            return Ok(false);
        }
        self.read_next()?;
        Ok(true)
    }

    fn read_next(&mut self) -> Result<()> {
        self.edge_pointer = self.storage.edge_pointer(self.next_edge);
        self.edge_id = self.next_edge;
        self.node = self.storage.get_other_node(self.base_node, self.edge_pointer);

        self.next_edge = self
            .storage
            .edges
            .get_int(self.storage.link_pos(self.base_node, self.node, self.edge_pointer));
        if self.next_edge == self.edge_id {
            return Err(GraphError::Corruption(format!(
                "endless loop detected for base node {}, node {}",
                self.base_node, self.node
            )));
        }

        self.flags = self.storage.edges.get_int(self.edge_pointer + E_FLAGS);
        if self.base_node > self.node {
            self.flags = self.storage.encoder.swap_direction(self.flags);
        }
        Ok(())
    }

    /// Rewrites the flags of the current edge. `flags` is interpreted in
    /// the cursor's `base_node -> node` orientation; the record is written
    /// back in canonical order.
    pub fn set_flags(&mut self, flags: i32) {
        self.flags = flags;
        let next = self
            .storage
            .edges
            .get_int(self.storage.link_pos(self.base_node, self.node, self.edge_pointer));
        let next_other = self
            .storage
            .edges
            .get_int(self.storage.link_pos(self.node, self.base_node, self.edge_pointer));
        let distance = self.storage.edge_distance(self.edge_pointer);
        let name = self.storage.edges.get_int(self.edge_pointer + E_NAME);
        self.storage.write_edge(
            self.edge_id,
            self.base_node,
            self.node,
            next,
            next_other,
            distance,
            flags,
            name,
        );
    }

    pub fn set_distance(&mut self, distance: f64) {
        let at = self.edge_pointer + super::E_DIST;
        self.storage.edges.set_int(at, crate::codec::dist_to_int(distance));
    }

    /// Attaches a pillar polyline, given in the cursor's traversal order.
    /// On-disk order is always canonical.
    pub fn set_way_geometry(&mut self, pillars: &PointList) -> Result<()> {
        let reverse = self.base_node > self.node;
        self.storage
            .write_way_geometry(self.edge_pointer, reverse, pillars)
    }
}

impl EdgeRead for EdgeCursorMut<'_> {
    fn edge(&self) -> EdgeId {
        self.edge_id
    }

    fn base_node(&self) -> NodeId {
        self.base_node
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn flags(&self) -> i32 {
        self.flags
    }

    fn distance(&self) -> f64 {
        self.storage.edge_distance(self.edge_pointer)
    }

    fn name_ref(&self) -> i32 {
        self.storage.edges.get_int(self.edge_pointer + E_NAME)
    }

    fn way_geometry(&self) -> PointList {
        self.storage
            .read_way_geometry(self.edge_pointer, self.base_node > self.node)
    }

    fn is_empty(&self) -> bool {
        false
    }
}

/// Raw scan over all edge records in id order.
pub struct AllEdgesCursor<'a> {
    storage: &'a GraphStorage,
    edge: EdgeId,
}

impl<'a> AllEdgesCursor<'a> {
    pub(crate) fn new(storage: &'a GraphStorage) -> Self {
        Self { storage, edge: -1 }
    }

    pub fn next(&mut self) -> bool {
        self.edge += 1;
        self.edge < self.storage.edge_count
    }

    pub fn node_a(&self) -> NodeId {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + super::E_NODEA)
    }

    pub fn node_b(&self) -> NodeId {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + super::E_NODEB)
    }
}

impl EdgeRead for AllEdgesCursor<'_> {
    fn edge(&self) -> EdgeId {
        self.edge
    }

    fn base_node(&self) -> NodeId {
        self.node_a()
    }

    fn node(&self) -> NodeId {
        self.node_b()
    }

    fn flags(&self) -> i32 {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + E_FLAGS)
    }

    fn distance(&self) -> f64 {
        self.storage
            .edge_distance(self.storage.edge_pointer(self.edge))
    }

    fn name_ref(&self) -> i32 {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + E_NAME)
    }

    fn way_geometry(&self) -> PointList {
        // Records are canonical, so the scan never reverses.
        self.storage
            .read_way_geometry(self.storage.edge_pointer(self.edge), false)
    }

    fn is_empty(&self) -> bool {
        false
    }
}

/// Raw scan with per-edge mutation, for bulk fixups.
pub struct AllEdgesCursorMut<'a> {
    storage: &'a mut GraphStorage,
    edge: EdgeId,
}

impl<'a> AllEdgesCursorMut<'a> {
    pub(crate) fn new(storage: &'a mut GraphStorage) -> Self {
        Self { storage, edge: -1 }
    }

    pub fn next(&mut self) -> bool {
        self.edge += 1;
        self.edge < self.storage.edge_count
    }

    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    pub fn node_a(&self) -> NodeId {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + super::E_NODEA)
    }

    pub fn node_b(&self) -> NodeId {
        self.storage
            .edges
            .get_int(self.storage.edge_pointer(self.edge) + super::E_NODEB)
    }

    pub fn distance(&self) -> f64 {
        self.storage
            .edge_distance(self.storage.edge_pointer(self.edge))
    }

    pub fn set_distance(&mut self, distance: f64) {
        let at = self.storage.edge_pointer(self.edge) + super::E_DIST;
        self.storage.edges.set_int(at, crate::codec::dist_to_int(distance));
    }

    pub fn set_way_geometry(&mut self, pillars: &PointList) -> Result<()> {
        let pointer = self.storage.edge_pointer(self.edge);
        self.storage.write_way_geometry(pointer, false, pillars)
    }
}
