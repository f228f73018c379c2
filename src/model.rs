use crate::error::Result;

pub type NodeId = i32;
pub type EdgeId = i32;

/// Sentinel terminating adjacency chains and marking "no edge".
pub const NO_EDGE: EdgeId = -1;

pub fn edge_is_valid(edge: EdgeId) -> bool {
    edge > NO_EDGE
}

/// Shared lifecycle of everything backed by on-disk storage.
pub trait Storable {
    /// Allocates fresh storage. `capacity` is a hint in backend-specific
    /// units (bytes for a raw store, expected node count for the graph).
    fn create_new(&mut self, capacity: u64) -> Result<()>;
    /// Opens existing storage. `Ok(false)` means nothing was found on disk.
    fn load_existing(&mut self) -> Result<bool>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn capacity(&self) -> u64;
}

/// Geographic bounding box in degrees, tracked over all stored nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// The inverted-empty box: folding any point into it yields that point.
    pub fn inverse() -> Self {
        Self {
            min_lat: f64::MAX,
            max_lat: -f64::MAX,
            min_lon: f64::MAX,
            max_lon: -f64::MAX,
        }
    }

    pub fn update(&mut self, lat: f64, lon: f64) {
        if lat > self.max_lat {
            self.max_lat = lat;
        }
        if lat < self.min_lat {
            self.min_lat = lat;
        }
        if lon > self.max_lon {
            self.max_lon = lon;
        }
        if lon < self.min_lon {
            self.min_lon = lon;
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_box_folds_to_first_point() {
        let mut bounds = BoundingBox::inverse();
        bounds.update(48.1, 11.5);
        assert_eq!(bounds.min_lat, 48.1);
        assert_eq!(bounds.max_lat, 48.1);
        assert_eq!(bounds.min_lon, 11.5);
        assert_eq!(bounds.max_lon, 11.5);
    }

    #[test]
    fn update_extends_bounds() {
        let mut bounds = BoundingBox::inverse();
        bounds.update(0.0, 0.0);
        bounds.update(1.0, -2.0);
        assert!(bounds.contains(0.5, -1.0));
        assert!(!bounds.contains(2.0, 0.0));
    }

    #[test]
    fn edge_validity_uses_sentinel() {
        assert!(!edge_is_valid(NO_EDGE));
        assert!(edge_is_valid(0));
        assert!(edge_is_valid(7));
    }
}
