use crate::error::{GraphError, Result};

/// Turn indication attached to each entry of a [`WayList`].
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TurnInstruction {
    ContinueOnStreet = 0,
    TurnLeft = 1,
    TurnRight = 2,
}

impl TurnInstruction {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::ContinueOnStreet),
            1 => Ok(Self::TurnLeft),
            2 => Ok(Self::TurnRight),
            other => Err(GraphError::Corruption(format!(
                "unknown turn instruction code: {other}"
            ))),
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Turn-by-turn sequence: parallel instruction/street-name arrays with the
/// same size/capacity discipline as [`PointList`](crate::coll::PointList).
#[derive(Debug, Clone, PartialEq)]
pub struct WayList {
    indications: Vec<TurnInstruction>,
    names: Vec<String>,
    size: usize,
}

impl WayList {
    pub fn new() -> Self {
        Self::with_capacity(10)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(5);
        Self {
            indications: vec![TurnInstruction::ContinueOnStreet; capacity],
            names: vec![String::new(); capacity],
            size: 0,
        }
    }

    pub fn add(&mut self, indication: TurnInstruction, name: impl Into<String>) {
        if self.size == self.indications.len() {
            let capacity = (self.size * 3 / 2).max(5);
            self.indications
                .resize(capacity, TurnInstruction::ContinueOnStreet);
            self.names.resize(capacity, String::new());
        }
        self.indications[self.size] = indication;
        self.names[self.size] = name.into();
        self.size += 1;
    }

    pub fn set(&mut self, index: usize, indication: TurnInstruction, name: impl Into<String>) {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        self.indications[index] = indication;
        self.names[index] = name.into();
    }

    pub fn indication(&self, index: usize) -> TurnInstruction {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        self.indications[index]
    }

    pub fn name(&self, index: usize) -> &str {
        assert!(
            index < self.size,
            "index {index} out of bounds for size {}",
            self.size
        );
        &self.names[index]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Reverses both parallel arrays in lockstep.
    pub fn reverse(&mut self) {
        let half = self.size / 2;
        for i in 0..half {
            let swap = self.size - i - 1;
            self.indications.swap(i, swap);
            self.names.swap(i, swap);
        }
    }

    pub fn clear(&mut self) {
        self.size = 0;
    }

    pub fn trim_to_size(&mut self, new_size: usize) {
        assert!(
            new_size <= self.size,
            "new size needs to be smaller than old size"
        );
        self.size = new_size;
    }
}

impl Default for WayList {
    fn default() -> Self {
        Self::new()
    }
}
