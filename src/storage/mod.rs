//! The graph storage engine.
//!
//! Four word-addressed areas hold the whole road graph: fixed-width node
//! records (`nodes`), fixed-width edge records (`egdes`; the misspelling
//! is part of the historical on-disk format), the variable-length pillar
//! geometry area (`geometry`) and the deduplicated street-name area
//! (`names`).
//!
//! Adjacency is an intrusive linked list threaded through the shared edge
//! records: each edge carries one "next" pointer per endpoint, and each
//! node's record holds the head of its chain. Every stored edge satisfies
//! `node_a <= node_b`; flags and pillar polylines are expressed in that
//! canonical direction and re-oriented on read when an edge is traversed
//! from the other end.
//!
//! Life cycle: construction, optional configuration, `create_new` or
//! `load_existing`, usage, `close`.

pub mod compact;
pub mod cursor;
mod names;

pub use compact::OptimizeReport;
pub use names::NameTable;

use std::fmt;

use roaring::RoaringBitmap;
use tracing::info;

use crate::codec::{degree_to_int, dist_to_int, int_to_degree, int_to_dist};
use crate::coll::PointList;
use crate::encode::{CarFlagEncoder, CombinedEncoder, EdgeFilter};
use crate::error::{GraphError, Result};
use crate::model::{edge_is_valid, BoundingBox, EdgeId, NodeId, Storable, NO_EDGE};
use crate::store::{DataAccess, Directory};
use cursor::{AllEdgesCursor, AllEdgesCursorMut, EdgeCursor, EdgeCursorMut};

// Edge record layout, in words: node_a, node_b, link_a, link_b, dist,
// flags, name ref, geometry ref.
pub(crate) const E_NODEA: u64 = 0;
pub(crate) const E_NODEB: u64 = 1;
pub(crate) const E_LINKA: u64 = 2;
pub(crate) const E_LINKB: u64 = 3;
pub(crate) const E_DIST: u64 = 4;
pub(crate) const E_FLAGS: u64 = 5;
pub(crate) const E_NAME: u64 = 6;
pub(crate) const E_GEO: u64 = 7;
pub(crate) const EDGE_ENTRY_INTS: u64 = 8;

// Node record layout, in words: adjacency head, lat, lon.
pub(crate) const N_EDGE_REF: u64 = 0;
pub(crate) const N_LAT: u64 = 1;
pub(crate) const N_LON: u64 = 2;
pub(crate) const NODE_ENTRY_INTS: u64 = 3;

const NODES_FILE: &str = "nodes";
// Misspelled since the first release; renaming would break every stored graph.
const EDGES_FILE: &str = "egdes";
const GEOMETRY_FILE: &str = "geometry";
const NAMES_FILE: &str = "names";

/// Ceiling for the tail walk when appending to an adjacency chain.
const MAX_APPEND_HOPS: u32 = 10_000;

fn identity_hash() -> i32 {
    crc32fast::hash(b"meridian::storage::GraphStorage") as i32
}

/// The main graph storage implementation. See the module documentation for
/// the data layout.
pub struct GraphStorage {
    dir: Directory,
    pub(crate) nodes: DataAccess,
    pub(crate) edges: DataAccess,
    pub(crate) geometry: DataAccess,
    pub(crate) names: NameTable,
    pub(crate) node_entry_size: u64,
    pub(crate) edge_entry_size: u64,
    pub(crate) node_count: i32,
    pub(crate) edge_count: i32,
    bounds: BoundingBox,
    pub(crate) removed_nodes: Option<RoaringBitmap>,
    max_geo_ref: i32,
    initialized: bool,
    pub(crate) encoder: Box<dyn CombinedEncoder>,
}

impl GraphStorage {
    pub fn new(dir: Directory) -> Result<Self> {
        Self::with_encoder(dir, Box::new(CarFlagEncoder::default()))
    }

    pub fn with_encoder(dir: Directory, encoder: Box<dyn CombinedEncoder>) -> Result<Self> {
        let nodes = dir.find_create(NODES_FILE)?;
        let edges = dir.find_create(EDGES_FILE)?;
        let geometry = dir.find_create(GEOMETRY_FILE)?;
        let names = NameTable::new(dir.find_create(NAMES_FILE)?);
        Ok(Self {
            dir,
            nodes,
            edges,
            geometry,
            names,
            node_entry_size: NODE_ENTRY_INTS,
            edge_entry_size: EDGE_ENTRY_INTS,
            node_count: 0,
            edge_count: 0,
            bounds: BoundingBox::inverse(),
            removed_nodes: None,
            max_geo_ref: 1,
            initialized: false,
            encoder,
        })
    }

    fn check_not_initialized(&self) -> Result<()> {
        if self.initialized {
            return Err(GraphError::InvalidState(
                "cannot configure the storage after create_new or load_existing; \
                 calling either twice is not allowed either"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Configures the growth granularity of all four areas. Only valid
    /// before initialization.
    pub fn set_segment_size(&mut self, bytes: usize) -> Result<()> {
        self.check_not_initialized()?;
        self.nodes.set_segment_size(bytes)?;
        self.edges.set_segment_size(bytes)?;
        self.geometry.set_segment_size(bytes)?;
        self.names.store_mut().set_segment_size(bytes)?;
        Ok(())
    }

    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    pub fn edge_count(&self) -> i32 {
        self.edge_count
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn version(&self) -> u32 {
        self.nodes.version()
    }

    fn node_pointer(&self, node: NodeId) -> u64 {
        node as u64 * self.node_entry_size
    }

    pub(crate) fn edge_pointer(&self, edge: EdgeId) -> u64 {
        edge as u64 * self.edge_entry_size
    }

    pub fn latitude(&self, node: NodeId) -> f64 {
        int_to_degree(self.nodes.get_int(self.node_pointer(node) + N_LAT))
    }

    pub fn longitude(&self, node: NodeId) -> f64 {
        int_to_degree(self.nodes.get_int(self.node_pointer(node) + N_LON))
    }

    pub fn set_node(&mut self, node: NodeId, lat: f64, lon: f64) -> Result<()> {
        if node < 0 {
            return Err(GraphError::InvalidArgument(format!(
                "negative node id {node}"
            )));
        }
        self.ensure_node_index(node)?;
        let pointer = self.node_pointer(node);
        self.nodes.set_int(pointer + N_LAT, degree_to_int(lat));
        self.nodes.set_int(pointer + N_LON, degree_to_int(lon));
        self.bounds.update(lat, lon);
        Ok(())
    }

    /// Rounds `delta` bytes up to whole segments and grows the store.
    fn inc_capacity(store: &mut DataAccess, initialized: bool, delta: u64) -> Result<u64> {
        if !initialized {
            return Err(GraphError::InvalidState(
                "call create_new before inserting".into(),
            ));
        }
        let segment = store.segment_size() as u64;
        let mut grow = delta / segment * segment;
        if delta % segment != 0 {
            grow += segment;
        }
        let target = store.capacity() + grow;
        store.ensure_capacity(target)?;
        Ok(target)
    }

    fn ensure_node_index(&mut self, node: NodeId) -> Result<()> {
        if node < self.node_count {
            return Ok(());
        }

        let old_count = self.node_count as u64;
        self.node_count = node + 1;
        let needed = self.node_count as u64 * self.node_entry_size * 4;
        if needed <= self.nodes.capacity() {
            return Ok(());
        }

        let delta = needed - self.nodes.capacity();
        let new_bytes = Self::inc_capacity(&mut self.nodes, self.initialized, delta)?;
        self.init_node_refs(old_count * self.node_entry_size, new_bytes / 4);
        Ok(())
    }

    /// Seeds the adjacency heads of the node area with the empty-edge value.
    fn init_node_refs(&mut self, from_word: u64, to_word: u64) {
        let mut pointer = from_word + N_EDGE_REF;
        while pointer < to_word {
            self.nodes.set_int(pointer, NO_EDGE);
            pointer += self.node_entry_size;
        }
    }

    fn ensure_edge_index(&mut self, edge_count: i32) -> Result<()> {
        let needed = edge_count as u64 * self.edge_entry_size * 4;
        if needed <= self.edges.capacity() {
            return Ok(());
        }
        let delta = needed - self.edges.capacity();
        Self::inc_capacity(&mut self.edges, self.initialized, delta)?;
        Ok(())
    }

    fn ensure_geometry(&mut self, index: u64, size_words: u64) -> Result<()> {
        let needed = (index + size_words) * 4;
        if needed <= self.geometry.capacity() {
            return Ok(());
        }
        let delta = needed - self.geometry.capacity();
        Self::inc_capacity(&mut self.geometry, self.initialized, delta)?;
        Ok(())
    }

    /// Inserts an edge with default flags from the configured encoder.
    pub fn edge_default(
        &mut self,
        a: NodeId,
        b: NodeId,
        distance: f64,
        both_directions: bool,
        name: i32,
    ) -> Result<EdgeCursorMut<'_>> {
        let flags = self.encoder.flags_default(both_directions);
        self.edge(a, b, distance, flags, name)
    }

    /// Inserts an edge between `a` and `b` and returns a cursor positioned
    /// on it, seen from `a`.
    pub fn edge(
        &mut self,
        a: NodeId,
        b: NodeId,
        distance: f64,
        flags: i32,
        name: i32,
    ) -> Result<EdgeCursorMut<'_>> {
        if a < 0 || b < 0 {
            return Err(GraphError::InvalidArgument(format!(
                "invalid endpoints {a}->{b}"
            )));
        }
        self.ensure_node_index(a.max(b))?;
        let edge = self.internal_edge_add(a, b, distance, flags, name)?;
        let mut cursor = EdgeCursorMut::chain(self, edge, a);
        cursor.next()?;
        Ok(cursor)
    }

    fn internal_edge_add(
        &mut self,
        from: NodeId,
        to: NodeId,
        distance: f64,
        flags: i32,
        name: i32,
    ) -> Result<EdgeId> {
        let edge = self.next_edge()?;
        self.connect_new_edge(from, edge)?;
        if from != to {
            self.connect_new_edge(to, edge)?;
        }
        self.write_edge(edge, from, to, NO_EDGE, NO_EDGE, distance, flags, name);
        Ok(edge)
    }

    fn next_edge(&mut self) -> Result<EdgeId> {
        let edge = self.edge_count;
        self.edge_count = self.edge_count.checked_add(1).ok_or_else(|| {
            GraphError::InvalidState("too many edges; the next edge id would overflow".into())
        })?;
        self.ensure_edge_index(self.edge_count)?;
        Ok(edge)
    }

    /// Appends `new_edge` to the adjacency chain of `node`, walking to the
    /// tail so iteration order equals insertion order.
    fn connect_new_edge(&mut self, node: NodeId, new_edge: EdgeId) -> Result<()> {
        let node_pointer = self.node_pointer(node);
        let head = self.nodes.get_int(node_pointer + N_EDGE_REF);
        if !edge_is_valid(head) {
            self.nodes.set_int(node_pointer + N_EDGE_REF, new_edge);
            return Ok(());
        }

        let mut edge = head;
        for _ in 0..MAX_APPEND_HOPS {
            let pointer = self.edge_pointer(edge);
            let other = self.get_other_node(node, pointer);
            let link = self.link_pos(node, other, pointer);
            let next = self.edges.get_int(link);
            if !edge_is_valid(next) {
                self.edges.set_int(link, new_edge);
                return Ok(());
            }
            edge = next;
        }
        Err(GraphError::Corruption(format!(
            "endless loop? adjacency chain of node {node} exceeds {MAX_APPEND_HOPS} edges"
        )))
    }

    /// Writes an edge record, canonicalizing so that `node_a <= node_b`.
    /// The geometry reference of the record is left untouched.
    pub(crate) fn write_edge(
        &mut self,
        edge: EdgeId,
        mut node_this: NodeId,
        mut node_other: NodeId,
        mut next: EdgeId,
        mut next_other: EdgeId,
        distance: f64,
        mut flags: i32,
        name: i32,
    ) -> u64 {
        if node_this > node_other {
            std::mem::swap(&mut node_this, &mut node_other);
            std::mem::swap(&mut next, &mut next_other);
            flags = self.encoder.swap_direction(flags);
        }

        let pointer = self.edge_pointer(edge);
        self.edges.set_int(pointer + E_NODEA, node_this);
        self.edges.set_int(pointer + E_NODEB, node_other);
        self.edges.set_int(pointer + E_LINKA, next);
        self.edges.set_int(pointer + E_LINKB, next_other);
        self.edges.set_int(pointer + E_DIST, dist_to_int(distance));
        self.edges.set_int(pointer + E_FLAGS, flags);
        self.edges.set_int(pointer + E_NAME, name);
        pointer
    }

    /// The slot holding the next-edge link owned by `node_this` within the
    /// record at `edge_pointer`.
    pub(crate) fn link_pos(&self, node_this: NodeId, node_other: NodeId, edge_pointer: u64) -> u64 {
        if node_this <= node_other {
            edge_pointer + E_LINKA
        } else {
            edge_pointer + E_LINKB
        }
    }

    pub(crate) fn get_other_node(&self, node: NodeId, edge_pointer: u64) -> NodeId {
        let node_a = self.edges.get_int(edge_pointer + E_NODEA);
        if node_a == node {
            return self.edges.get_int(edge_pointer + E_NODEB);
        }
        node_a
    }

    pub(crate) fn edge_distance(&self, edge_pointer: u64) -> f64 {
        int_to_dist(self.edges.get_int(edge_pointer + E_DIST))
    }

    /// Iterates the edges incident to `node`, in insertion order.
    pub fn get_edges(&self, node: NodeId) -> EdgeCursor<'_> {
        self.get_edges_where(node, None)
    }

    pub fn get_edges_filtered<'a>(
        &'a self,
        node: NodeId,
        filter: &'a dyn EdgeFilter,
    ) -> EdgeCursor<'a> {
        self.get_edges_where(node, Some(filter))
    }

    fn get_edges_where<'a>(
        &'a self,
        node: NodeId,
        filter: Option<&'a dyn EdgeFilter>,
    ) -> EdgeCursor<'a> {
        assert!(
            node >= 0 && node < self.node_count,
            "node {node} out of bounds [0,{})",
            self.node_count
        );
        let head = self.nodes.get_int(self.node_pointer(node) + N_EDGE_REF);
        EdgeCursor::chain(self, head, node, filter)
    }

    /// Like [`get_edges`](Self::get_edges), with in-place mutation of the
    /// current edge.
    pub fn get_edges_mut(&mut self, node: NodeId) -> EdgeCursorMut<'_> {
        assert!(
            node >= 0 && node < self.node_count,
            "node {node} out of bounds [0,{})",
            self.node_count
        );
        let head = self.nodes.get_int(self.node_pointer(node) + N_EDGE_REF);
        EdgeCursorMut::chain(self, head, node)
    }

    /// A positioned single-edge view seen from `end_node`: the cursor
    /// reports the edge as traversed into `end_node`, `next()` returns
    /// false. If `end_node` matches neither endpoint an empty sentinel
    /// cursor is returned.
    pub fn get_edge_props(&self, edge: EdgeId, end_node: NodeId) -> Result<EdgeCursor<'_>> {
        if edge <= NO_EDGE || edge >= self.edge_count {
            return Err(GraphError::InvalidArgument(format!(
                "edge id {edge} out of bounds [0,{})",
                self.edge_count
            )));
        }
        if end_node < 0 || end_node >= self.node_count {
            return Err(GraphError::InvalidArgument(format!(
                "end node {end_node} out of bounds [0,{})",
                self.node_count
            )));
        }
        let pointer = self.edge_pointer(edge);
        let node_a = self.edges.get_int(pointer + E_NODEA);
        let node_b = self.edges.get_int(pointer + E_NODEB);
        if end_node == node_b {
            Ok(EdgeCursor::single(self, edge, node_a, node_b))
        } else if end_node == node_a {
            Ok(EdgeCursor::single(self, edge, node_b, node_a))
        } else {
            Ok(EdgeCursor::empty(self))
        }
    }

    /// Raw scan over every edge record, including records orphaned by
    /// [`optimize`](Self::optimize).
    pub fn all_edges(&self) -> AllEdgesCursor<'_> {
        AllEdgesCursor::new(self)
    }

    pub fn all_edges_mut(&mut self) -> AllEdgesCursorMut<'_> {
        AllEdgesCursorMut::new(self)
    }

    pub fn add_name(&mut self, name: &str) -> Result<i32> {
        self.names.add(name)
    }

    pub fn get_name(&self, offset: i32) -> Result<String> {
        self.names.get(offset)
    }

    pub fn name_count(&self) -> i32 {
        self.names.name_count()
    }

    fn next_geo_ref(&mut self, array_words: i32) -> i32 {
        let geo_ref = self.max_geo_ref;
        // One extra word stores the point count itself.
        self.max_geo_ref += array_words + 1;
        geo_ref
    }

    /// Writes a pillar polyline for the edge record at `edge_pointer`.
    /// `reverse` is set when the caller traverses against canonical order;
    /// on-disk order is always `node_a -> node_b`.
    pub(crate) fn write_way_geometry(
        &mut self,
        edge_pointer: u64,
        reverse: bool,
        pillars: &PointList,
    ) -> Result<()> {
        if pillars.is_empty() {
            self.edges.set_int(edge_pointer + E_GEO, 0);
            return Ok(());
        }

        let len = pillars.size();
        let geo_ref = self.next_geo_ref(len as i32 * 2);
        self.edges.set_int(edge_pointer + E_GEO, geo_ref);
        self.ensure_geometry(geo_ref as u64, len as u64 * 2 + 1)?;
        self.geometry.set_int(geo_ref as u64, len as i32);
        for i in 0..len {
            let src = if reverse { len - 1 - i } else { i };
            let at = geo_ref as u64 + 1 + i as u64 * 2;
            self.geometry
                .set_int(at, degree_to_int(pillars.latitude(src)));
            self.geometry
                .set_int(at + 1, degree_to_int(pillars.longitude(src)));
        }
        Ok(())
    }

    /// Reads the pillar polyline of the edge record at `edge_pointer`,
    /// reversed when `reverse` is set.
    pub(crate) fn read_way_geometry(&self, edge_pointer: u64, reverse: bool) -> PointList {
        let geo_ref = self.edges.get_int(edge_pointer + E_GEO);
        let count = if geo_ref > 0 {
            self.geometry.get_int(geo_ref as u64)
        } else {
            0
        };
        let mut pillars = PointList::with_capacity(count as usize);
        for i in 0..count as u64 {
            let at = geo_ref as u64 + 1 + i * 2;
            pillars.add(
                int_to_degree(self.geometry.get_int(at)),
                int_to_degree(self.geometry.get_int(at + 1)),
            );
        }
        if reverse {
            pillars.reverse();
        }
        pillars
    }

    /// Raw clone into another storage with the same record layout.
    pub fn copy_to(&self, other: &mut GraphStorage) -> Result<()> {
        if other.edge_entry_size != self.edge_entry_size
            || other.node_entry_size != self.node_entry_size
        {
            return Err(GraphError::InvalidState(
                "record layouts of source and target storage differ".into(),
            ));
        }
        self.edges.copy_to(&mut other.edges)?;
        other.edge_count = self.edge_count;
        self.nodes.copy_to(&mut other.nodes)?;
        other.node_count = self.node_count;
        self.geometry.copy_to(&mut other.geometry)?;
        other.max_geo_ref = self.max_geo_ref;
        self.names.store().copy_to(other.names.store_mut())?;
        other.names.set_name_count(self.names.name_count());
        other.bounds = self.bounds;
        other.removed_nodes = self.removed_nodes.clone();
        other.initialized = true;
        Ok(())
    }

    pub(crate) fn trim_node_area(&mut self) -> Result<()> {
        let bytes = self.node_count as u64 * self.node_entry_size * 4;
        self.nodes.trim_to(bytes)
    }
}

impl Storable for GraphStorage {
    /// `capacity` is the expected node count.
    fn create_new(&mut self, capacity: u64) -> Result<()> {
        self.check_not_initialized()?;
        let init_bytes = (capacity * 4).max(100);
        self.nodes.create_new(init_bytes * self.node_entry_size)?;
        self.initialized = true;
        self.init_node_refs(0, self.nodes.capacity() / 4);

        self.edges.create_new(init_bytes * self.edge_entry_size)?;
        self.geometry.create_new(init_bytes)?;
        self.names.create_new(init_bytes)?;
        info!(dir = %self.dir.path().display(), "storage.created");
        Ok(())
    }

    fn load_existing(&mut self) -> Result<bool> {
        self.check_not_initialized()?;
        if !self.edges.load_existing()? {
            return Ok(false);
        }
        if !self.nodes.load_existing()? {
            return Err(GraphError::Corruption(format!(
                "cannot load nodes; corrupt directory? {}",
                self.dir.path().display()
            )));
        }
        if !self.geometry.load_existing()? {
            return Err(GraphError::Corruption(format!(
                "cannot load geometry; corrupt directory? {}",
                self.dir.path().display()
            )));
        }
        if !self.names.load_existing()? {
            return Err(GraphError::Corruption(format!(
                "cannot load names; corrupt directory? {}",
                self.dir.path().display()
            )));
        }
        if self.nodes.version() != self.edges.version() {
            return Err(GraphError::Corruption(
                "nodes and edges files have different versions".into(),
            ));
        }

        if self.nodes.get_header(0) != identity_hash() {
            return Err(GraphError::Corruption(format!(
                "the graph in {} was not created by this storage implementation",
                self.dir.path().display()
            )));
        }
        if self.nodes.get_header(1) as u64 != self.node_entry_size {
            return Err(GraphError::Corruption(format!(
                "node record layout mismatch: stored {} words, expected {}",
                self.nodes.get_header(1),
                self.node_entry_size
            )));
        }
        self.node_count = self.nodes.get_header(2);
        self.bounds = BoundingBox {
            min_lon: int_to_degree(self.nodes.get_header(3)),
            max_lon: int_to_degree(self.nodes.get_header(4)),
            min_lat: int_to_degree(self.nodes.get_header(5)),
            max_lat: int_to_degree(self.nodes.get_header(6)),
        };

        if self.edges.get_header(0) as u64 != self.edge_entry_size {
            return Err(GraphError::Corruption(format!(
                "edge record layout mismatch: stored {} words, expected {}",
                self.edges.get_header(0),
                self.edge_entry_size
            )));
        }
        self.edge_count = self.edges.get_header(1);
        self.max_geo_ref = self.geometry.get_header(0);

        self.initialized = true;
        info!(
            dir = %self.dir.path().display(),
            nodes = self.node_count,
            edges = self.edge_count,
            names = self.names.name_count(),
            "storage.loaded"
        );
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        self.nodes.set_header(0, identity_hash());
        self.nodes.set_header(1, self.node_entry_size as i32);
        self.nodes.set_header(2, self.node_count);
        self.nodes.set_header(3, degree_to_int(self.bounds.min_lon));
        self.nodes.set_header(4, degree_to_int(self.bounds.max_lon));
        self.nodes.set_header(5, degree_to_int(self.bounds.min_lat));
        self.nodes.set_header(6, degree_to_int(self.bounds.max_lat));

        self.edges.set_header(0, self.edge_entry_size as i32);
        self.edges.set_header(1, self.edge_count);

        self.geometry.set_header(0, self.max_geo_ref);

        self.geometry.flush()?;
        self.edges.flush()?;
        self.nodes.flush()?;
        self.names.flush()?;
        info!(
            dir = %self.dir.path().display(),
            nodes = self.node_count,
            edges = self.edge_count,
            "storage.flushed"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.edges.close()?;
        self.nodes.close()?;
        self.geometry.close()?;
        self.names.close()
    }

    fn capacity(&self) -> u64 {
        self.edges.capacity() + self.nodes.capacity()
    }
}

impl fmt::Display for GraphStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: u64 = 1 << 20;
        write!(
            f,
            "edges: {} ({} MB), nodes: {} ({} MB), geometry: {} ({} MB), names: {} ({} MB), bounds: {:?}",
            self.edge_count,
            self.edges.capacity() / MB,
            self.node_count,
            self.nodes.capacity() / MB,
            self.max_geo_ref,
            self.geometry.capacity() / MB,
            self.names.name_count(),
            self.names.store().capacity() / MB,
            self.bounds,
        )
    }
}
