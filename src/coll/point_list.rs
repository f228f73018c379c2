/// Slim polyline container: parallel latitude/longitude arrays with a
/// logical size tracked separately from the allocated capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct PointList {
    lats: Vec<f64>,
    lons: Vec<f64>,
    size: usize,
}

impl PointList {
    pub fn new() -> Self {
        Self::with_capacity(10)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(5);
        Self {
            lats: vec![0.0; capacity],
            lons: vec![0.0; capacity],
            size: 0,
        }
    }

    pub fn add(&mut self, lat: f64, lon: f64) {
        if self.size == self.lats.len() {
            let capacity = (self.size * 3 / 2).max(5);
            self.lats.resize(capacity, 0.0);
            self.lons.resize(capacity, 0.0);
        }
        self.lats[self.size] = lat;
        self.lons[self.size] = lon;
        self.size += 1;
    }

    pub fn set(&mut self, index: usize, lat: f64, lon: f64) {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        self.lats[index] = lat;
        self.lons[index] = lon;
    }

    pub fn latitude(&self, index: usize) -> f64 {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        self.lats[index]
    }

    pub fn longitude(&self, index: usize) -> f64 {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        self.lons[index]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn reverse(&mut self) {
        let half = self.size / 2;
        for i in 0..half {
            let swap = self.size - i - 1;
            self.lats.swap(i, swap);
            self.lons.swap(i, swap);
        }
    }

    /// Shrinks the logical size. The new size must not exceed the old one.
    pub fn trim_to_size(&mut self, new_size: usize) {
        assert!(
            new_size <= self.size,
            "new size needs to be smaller than old size"
        );
        self.size = new_size;
    }

    /// Drops spare capacity beyond the logical size.
    pub fn shrink_to_fit(&mut self) {
        self.lats.truncate(self.size);
        self.lons.truncate(self.size);
        self.lats.shrink_to_fit();
        self.lons.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.size = 0;
    }
}

impl Default for PointList {
    fn default() -> Self {
        Self::new()
    }
}
