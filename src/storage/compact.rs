//! Node removal and in-place compaction.
//!
//! Removal is lazy: nodes are marked in a transient, non-persistent set
//! and physically removed by [`GraphStorage::optimize`], which moves the
//! highest-indexed surviving nodes into the freed slots and rewrites the
//! affected edges. Edge records pointing at removed nodes are only
//! unlinked from the live adjacency chains, not reclaimed; reclaiming
//! them would require a second pass over the edge area.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use roaring::RoaringBitmap;
use serde::Serialize;
use tracing::info;

use crate::error::{GraphError, Result};
use crate::model::{edge_is_valid, EdgeId, NodeId};

use super::cursor::EdgeRead;
use super::{GraphStorage, E_FLAGS, E_LINKA, E_LINKB, E_NAME, E_NODEA, E_NODEB, N_EDGE_REF};

/// Ceiling for chain walks during compaction, mirroring insertion.
const MAX_CHAIN_HOPS: u32 = 10_000;

/// Summary of one [`GraphStorage::optimize`] run.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeReport {
    pub removed_nodes: u64,
    pub moved_nodes: u64,
    pub remaining_nodes: i32,
    pub duration_ms: f64,
}

impl GraphStorage {
    /// Marks a node for removal by the next [`optimize`](Self::optimize)
    /// call. The marker set is transient and never persisted.
    pub fn mark_node_removed(&mut self, node: NodeId) {
        assert!(
            node >= 0 && node < self.node_count,
            "node {node} out of bounds [0,{})",
            self.node_count
        );
        self.removed_nodes
            .get_or_insert_with(RoaringBitmap::new)
            .insert(node as u32);
    }

    pub fn is_node_removed(&self, node: NodeId) -> bool {
        self.removed_nodes
            .as_ref()
            .is_some_and(|set| set.contains(node as u32))
    }

    /// Applies all pending node removals, compacting the node area in
    /// place. Edge records of removed nodes stay behind as unlinked
    /// orphans; `edge_count` is unchanged.
    pub fn optimize(&mut self) -> Result<OptimizeReport> {
        let start = Instant::now();
        let removed = self
            .removed_nodes
            .as_ref()
            .map(|set| set.len())
            .unwrap_or(0);
        let moved = self.in_place_node_remove()?;
        self.trim_node_area()?;

        let report = OptimizeReport {
            removed_nodes: removed,
            moved_nodes: moved,
            remaining_nodes: self.node_count,
            duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
        };
        info!(
            removed_nodes = report.removed_nodes,
            moved_nodes = report.moved_nodes,
            remaining_nodes = report.remaining_nodes,
            duration_ms = report.duration_ms,
            "storage.optimize.completed"
        );
        Ok(report)
    }

    /// Unlinks all edges to removed nodes, then moves the last nodes into
    /// the freed slots and rewrites the node ids in every affected edge.
    fn in_place_node_remove(&mut self) -> Result<u64> {
        let Some(removed) = self.removed_nodes.take() else {
            return Ok(0);
        };
        let remove_count = removed.len();
        if remove_count == 0 {
            return Ok(0);
        }

        // Pair each of the highest-indexed surviving nodes with a freed
        // slot. Once the next candidate sits at or below the next freed
        // slot everything above is already collapsed.
        let mut old_to_new: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut to_move = self.node_count;
        for del_node in removed.iter() {
            let del_node = del_node as NodeId;
            to_move -= 1;
            while to_move >= 0 && removed.contains(to_move as u32) {
                to_move -= 1;
            }
            if to_move < del_node {
                break;
            }
            old_to_new.insert(to_move, del_node);
        }

        // Live neighbors of removed nodes need their chains spliced.
        let mut to_update: BTreeSet<NodeId> = BTreeSet::new();
        for del_node in removed.iter() {
            let del_node = del_node as NodeId;
            let mut iter = self.get_edges(del_node);
            while iter.next()? {
                let neighbor = iter.node();
                if removed.contains(neighbor as u32) {
                    continue;
                }
                to_update.insert(neighbor);
            }
        }

        for &node in &to_update {
            self.disconnect_removed_edges(node, &removed)?;
        }

        // Neighbors of moving nodes mark which edges need rewriting. At
        // this point no chain may reach a removed node anymore.
        let mut moved_neighbors: BTreeSet<NodeId> = BTreeSet::new();
        for &old_index in old_to_new.keys() {
            let mut iter = self.get_edges(old_index);
            while iter.next()? {
                let neighbor = iter.node();
                if removed.contains(neighbor as u32) {
                    return Err(GraphError::Corruption(format!(
                        "edge from moving node {old_index} to removed node {neighbor} \
                         should already be disconnected"
                    )));
                }
                moved_neighbors.insert(neighbor);
            }
        }

        // Move node records into the freed slots.
        for (&old_index, &new_index) in &old_to_new {
            let old_offset = old_index as u64 * self.node_entry_size;
            let new_offset = new_index as u64 * self.node_entry_size;
            for word in 0..self.node_entry_size {
                let value = self.nodes.get_int(old_offset + word);
                self.nodes.set_int(new_offset + word, value);
            }
        }

        // Rewrite every edge touching a moved region. Unchanged endpoints
        // remap to themselves; the write re-canonicalizes the order.
        for edge in 0..self.edge_count {
            let pointer = self.edge_pointer(edge);
            let node_a = self.edges.get_int(pointer + E_NODEA);
            let node_b = self.edges.get_int(pointer + E_NODEB);
            if !moved_neighbors.contains(&node_a) && !moved_neighbors.contains(&node_b) {
                continue;
            }

            let updated_a = old_to_new.get(&node_a).copied().unwrap_or(node_a);
            let updated_b = old_to_new.get(&node_b).copied().unwrap_or(node_b);
            let link_a = self.edges.get_int(self.link_pos(node_a, node_b, pointer));
            let link_b = self.edges.get_int(self.link_pos(node_b, node_a, pointer));
            let flags = self.edges.get_int(pointer + E_FLAGS);
            let name = self.edges.get_int(pointer + E_NAME);
            let distance = self.edge_distance(pointer);
            self.write_edge(edge, updated_a, updated_b, link_a, link_b, distance, flags, name);
        }

        // Orphaned edge records stay; only the node space shrinks.
        self.node_count -= remove_count as i32;
        Ok(old_to_new.len() as u64)
    }

    /// Splices every edge leading from `node` to a removed node out of
    /// `node`'s adjacency chain.
    fn disconnect_removed_edges(&mut self, node: NodeId, removed: &RoaringBitmap) -> Result<()> {
        let mut prev_pointer: Option<u64> = None;
        let mut edge = self
            .nodes
            .get_int(node as u64 * self.node_entry_size + N_EDGE_REF);
        let mut hops = 0u32;
        while edge_is_valid(edge) {
            let pointer = self.edge_pointer(edge);
            let other = self.get_other_node(node, pointer);
            let next = self.edges.get_int(self.link_pos(node, other, pointer));

            if removed.contains(other as u32) {
                self.internal_edge_disconnect(edge, prev_pointer, node, other);
            } else {
                prev_pointer = Some(pointer);
            }

            edge = next;
            hops += 1;
            if hops > MAX_CHAIN_HOPS {
                return Err(GraphError::Corruption(format!(
                    "endless loop? adjacency chain of node {node} exceeds {MAX_CHAIN_HOPS} edges"
                )));
            }
        }
        Ok(())
    }

    /// Removes `edge` from `base_node`'s chain. With no predecessor the
    /// successor becomes the node's new chain head; otherwise it is
    /// written into the predecessor's link slot owned by `base_node`.
    fn internal_edge_disconnect(
        &mut self,
        edge: EdgeId,
        prev_pointer: Option<u64>,
        base_node: NodeId,
        adj_node: NodeId,
    ) {
        let pointer = self.edge_pointer(edge);
        let next = self.edges.get_int(self.link_pos(base_node, adj_node, pointer));
        match prev_pointer {
            None => {
                let head = base_node as u64 * self.node_entry_size + N_EDGE_REF;
                self.nodes.set_int(head, next);
            }
            Some(prev) => {
                let link = if self.edges.get_int(prev + E_NODEA) == base_node {
                    prev + E_LINKA
                } else {
                    prev + E_LINKB
                };
                self.edges.set_int(link, next);
            }
        }
    }
}
