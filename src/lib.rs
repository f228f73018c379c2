//! meridian - compact, persistable road-graph storage with path extraction
//!
//! # Architecture
//!
//! - **Word-addressed stores**: every area is a resizable array of i32
//!   words with a small header, backed in RAM or by a memory-mapped file
//! - **Fixed-width records**: 3 words per node, 8 per edge; adjacency is
//!   an intrusive linked list threaded through the shared edge records
//! - **Canonical direction**: stored edges satisfy `node_a <= node_b`;
//!   flags and pillar polylines are re-oriented on read
//! - **Deduplicated names**: street names live once in a UTF-32 area and
//!   are referenced by offset
//! - **Path extraction**: walks a routing algorithm's predecessor chain
//!   and reconstructs points, distances and turn instructions
//!
//! # Usage example
//!
//! ```no_run
//! use meridian::{Directory, GraphStorage, Storable};
//!
//! # fn main() -> meridian::Result<()> {
//! let mut graph = GraphStorage::new(Directory::new("./graph.meridian"))?;
//! graph.create_new(100)?;
//!
//! graph.set_node(0, 48.1, 11.5)?;
//! graph.set_node(1, 48.2, 11.6)?;
//! let name = graph.add_name("Leopoldstraße")?;
//! graph.edge_default(0, 1, 1200.0, true, name)?;
//!
//! graph.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod coll;
pub mod encode;
pub mod error;
pub mod ingest;
pub mod model;
pub mod path;
pub mod storage;
pub mod store;

pub use coll::{PointList, TurnInstruction, WayList};
pub use encode::{
    AcceptAll, CarFlagEncoder, CombinedEncoder, DistanceCalc, EarthDistance, EdgeFilter,
    VehicleEncoder,
};
pub use error::{GraphError, Result};
pub use model::{edge_is_valid, BoundingBox, EdgeId, NodeId, Storable, NO_EDGE};
pub use path::{EdgeEntry, Path, PathEdges};
pub use storage::cursor::{EdgeCursor, EdgeCursorMut, EdgeRead};
pub use storage::{GraphStorage, NameTable, OptimizeReport};
pub use store::{AccessMode, DataAccess, Directory, StorageConfig};
