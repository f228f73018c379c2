use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{AccessMode, DataAccess, SEGMENT_SIZE_DEFAULT};

/// Backing configuration shared by all stores of one graph directory.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub access_mode: AccessMode,
    pub segment_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::Ram,
            segment_size: SEGMENT_SIZE_DEFAULT,
        }
    }
}

impl StorageConfig {
    /// Memory-mapped backing for graphs larger than available RAM.
    pub fn mmap() -> Self {
        Self {
            access_mode: AccessMode::Mmap,
            ..Self::default()
        }
    }
}

/// Names the stores of one graph and binds them to files in a directory.
///
/// `find_create` hands out a [`DataAccess`] bound to `<dir>/<name>`;
/// repeated calls with the same name always address the same backing file.
/// Ownership of the returned store moves to the caller; the graph storage
/// owns its four areas, the directory stays the naming and configuration
/// authority.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
    config: StorageConfig,
}

impl Directory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, StorageConfig::default())
    }

    pub fn with_config(path: impl AsRef<Path>, config: StorageConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_mode(&self) -> AccessMode {
        self.config.access_mode
    }

    pub fn find_create(&self, name: &str) -> Result<DataAccess> {
        fs::create_dir_all(&self.path)?;
        Ok(DataAccess::new(
            self.path.join(name),
            self.config.access_mode,
            self.config.segment_size,
        ))
    }
}
