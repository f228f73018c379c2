//! Way-segment insertion: the boundary an importer calls into.
//!
//! The importer hands over the full polyline of a segment between two
//! tower nodes. The ingester accumulates the per-leg distances, splits
//! the interior points off as the pillar polyline and inserts the edge.
//! Parsing and tag handling live entirely on the importer's side.

use serde::Serialize;
use tracing::warn;

use crate::coll::PointList;
use crate::encode::{DistanceCalc, EarthDistance};
use crate::error::{GraphError, Result};
use crate::model::NodeId;
use crate::storage::GraphStorage;

/// Substitute for degenerate zero-length segments, in meters. Two ways
/// that should cross in one shared point often end up in two nearly
/// identical points instead.
const MIN_DISTANCE: f64 = 0.0001;

#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub zero_distance_segments: u64,
}

pub struct WayIngester {
    distance_calc: Box<dyn DistanceCalc>,
    zero_distance_segments: u64,
}

impl WayIngester {
    pub fn new(distance_calc: Box<dyn DistanceCalc>) -> Self {
        Self {
            distance_calc,
            zero_distance_segments: 0,
        }
    }

    /// Inserts the edge `from -> to` described by `points` (tower node,
    /// pillar nodes, tower node). Returns the number of consumed points.
    pub fn add_way_segment(
        &mut self,
        graph: &mut GraphStorage,
        from: NodeId,
        to: NodeId,
        points: &PointList,
        flags: i32,
        name: i32,
    ) -> Result<usize> {
        if from < 0 || to < 0 {
            return Err(GraphError::InvalidArgument(format!(
                "invalid endpoints {from}->{to} for way segment"
            )));
        }
        let count = points.size();
        if count < 2 {
            return Err(GraphError::InvalidArgument(format!(
                "way segment needs at least two points, got {count}"
            )));
        }

        let mut distance = 0.0;
        let mut prev_lat = points.latitude(0);
        let mut prev_lon = points.longitude(0);
        let mut pillars = PointList::with_capacity(count.saturating_sub(2));
        for i in 1..count {
            let lat = points.latitude(i);
            let lon = points.longitude(i);
            distance += self.distance_calc.calc_dist(prev_lat, prev_lon, lat, lon);
            prev_lat = lat;
            prev_lon = lon;
            if count > 2 && i < count - 1 {
                pillars.add(lat, lon);
            }
        }
        if distance == 0.0 {
            self.zero_distance_segments += 1;
            warn!(from, to, "zero-length way segment, substituting minimal distance");
            distance = MIN_DISTANCE;
        }

        let mut edge = graph.edge(from, to, distance, flags, name)?;
        if count > 2 {
            edge.set_way_geometry(&pillars)?;
        }
        Ok(count)
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            zero_distance_segments: self.zero_distance_segments,
        }
    }
}

impl Default for WayIngester {
    fn default() -> Self {
        Self::new(Box::new(EarthDistance))
    }
}
