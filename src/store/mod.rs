//! Word-addressable backing stores.
//!
//! A [`DataAccess`] is a resizable array of 32-bit signed integers plus a
//! small fixed-size header, persisted as one file inside a graph directory.
//! Two backings exist behind the same surface: an in-memory segment array
//! that is written out on flush, and a memory-mapped file where reads and
//! writes hit the map directly. Growth always happens in whole segments.

mod directory;

pub use directory::{Directory, StorageConfig};

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use memmap2::MmapMut;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::Storable;

const MAGIC: &[u8; 8] = b"MERIDIAN";
const FORMAT_VERSION: u32 = 1;

/// Number of i32 header slots reserved per store, outside the payload.
pub const HEADER_SLOTS: usize = 20;
/// Magic + format version + segment size + capacity + header slots.
pub const HEADER_BYTES: u64 = 8 + 4 + 4 + 8 + (HEADER_SLOTS as u64) * 4;

pub const SEGMENT_SIZE_DEFAULT: usize = 1 << 20;

/// Backing strategy, chosen at construction via [`Directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// In-memory segment array, written to file on flush.
    Ram,
    /// Memory-mapped file; the OS pages data in and out.
    Mmap,
}

enum Backing {
    Ram { segments: Vec<Box<[i32]>> },
    Mmap { file: Option<File>, map: Option<MmapMut> },
}

pub struct DataAccess {
    path: PathBuf,
    segment_size: usize,
    segment_size_configured: bool,
    header: [i32; HEADER_SLOTS],
    version: u32,
    initialized: bool,
    backing: Backing,
}

impl DataAccess {
    pub(crate) fn new(path: PathBuf, mode: AccessMode, segment_size: usize) -> Self {
        let backing = match mode {
            AccessMode::Ram => Backing::Ram {
                segments: Vec::new(),
            },
            AccessMode::Mmap => Backing::Mmap {
                file: None,
                map: None,
            },
        };
        Self {
            path,
            segment_size,
            segment_size_configured: false,
            header: [0; HEADER_SLOTS],
            version: 0,
            initialized: false,
            backing,
        }
    }

    /// Configures the growth granularity. Only valid before initialization.
    pub fn set_segment_size(&mut self, bytes: usize) -> Result<()> {
        if self.initialized {
            return Err(GraphError::InvalidState(
                "cannot configure segment size after initialization".into(),
            ));
        }
        if bytes == 0 || bytes % 4 != 0 {
            return Err(GraphError::InvalidArgument(
                "segment size must be a positive multiple of 4".into(),
            ));
        }
        self.segment_size = bytes;
        self.segment_size_configured = true;
        Ok(())
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn ints_per_segment(&self) -> usize {
        self.segment_size / 4
    }

    fn segments_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.segment_size as u64)
    }

    /// Reads the 32-bit word at the given word index. Panics on an index
    /// beyond the current capacity; that is a programming error.
    pub fn get_int(&self, index: u64) -> i32 {
        match &self.backing {
            Backing::Ram { segments } => {
                let ints = self.segment_size / 4;
                segments[(index / ints as u64) as usize][(index % ints as u64) as usize]
            }
            Backing::Mmap { map, .. } => {
                let map = map.as_ref().expect("store is not initialized");
                let offset = (HEADER_BYTES + index * 4) as usize;
                i32::from_le_bytes(
                    map[offset..offset + 4]
                        .try_into()
                        .expect("slice has exactly 4 bytes"),
                )
            }
        }
    }

    /// Writes the 32-bit word at the given word index. Panics on an index
    /// beyond the current capacity; grow with [`ensure_capacity`] first.
    ///
    /// [`ensure_capacity`]: DataAccess::ensure_capacity
    pub fn set_int(&mut self, index: u64, value: i32) {
        let ints = self.ints_per_segment();
        match &mut self.backing {
            Backing::Ram { segments } => {
                segments[(index / ints as u64) as usize][(index % ints as u64) as usize] = value;
            }
            Backing::Mmap { map, .. } => {
                let map = map.as_mut().expect("store is not initialized");
                let offset = (HEADER_BYTES + index * 4) as usize;
                map[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    pub fn get_header(&self, slot: usize) -> i32 {
        self.header[slot]
    }

    pub fn set_header(&mut self, slot: usize, value: i32) {
        self.header[slot] = value;
    }

    /// Grows the payload to at least `bytes`, rounded up to whole segments.
    /// Never shrinks. New space reads as zero.
    pub fn ensure_capacity(&mut self, bytes: u64) -> Result<()> {
        if !self.initialized {
            return Err(GraphError::InvalidState(
                "call create_new or load_existing before growing".into(),
            ));
        }
        if bytes <= self.capacity() {
            return Ok(());
        }
        let target = self.segments_for(bytes) * self.segment_size as u64;
        debug!(path = %self.path.display(), from = self.capacity(), to = target, "store.grow");
        match &mut self.backing {
            Backing::Ram { segments } => {
                let ints = self.segment_size / 4;
                let want = (target / self.segment_size as u64) as usize;
                while segments.len() < want {
                    segments.push(vec![0i32; ints].into_boxed_slice());
                }
            }
            Backing::Mmap { file, map } => {
                let file = file.as_mut().expect("store is not initialized");
                // Unmap before resizing the underlying file.
                map.take();
                file.set_len(HEADER_BYTES + target)?;
                *map = Some(unsafe { MmapMut::map_mut(&*file)? });
            }
        }
        Ok(())
    }

    /// Drops segments beyond the given byte size.
    pub fn trim_to(&mut self, bytes: u64) -> Result<()> {
        if !self.initialized {
            return Err(GraphError::InvalidState("store is not initialized".into()));
        }
        let keep = self.segments_for(bytes);
        let target = keep * self.segment_size as u64;
        if target >= self.capacity() {
            return Ok(());
        }
        match &mut self.backing {
            Backing::Ram { segments } => segments.truncate(keep as usize),
            Backing::Mmap { file, map } => {
                let file = file.as_mut().expect("store is not initialized");
                map.take();
                file.set_len(HEADER_BYTES + target)?;
                *map = Some(unsafe { MmapMut::map_mut(&*file)? });
            }
        }
        Ok(())
    }

    /// Copies header slots and payload into `other`, growing it as needed.
    pub fn copy_to(&self, other: &mut DataAccess) -> Result<()> {
        if !other.initialized {
            other.create_new(self.capacity())?;
        } else {
            other.ensure_capacity(self.capacity())?;
        }
        other.header = self.header;
        let words = self.capacity() / 4;
        for index in 0..words {
            other.set_int(index, self.get_int(index));
        }
        Ok(())
    }

    fn write_file_header(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.segment_size as u32).to_le_bytes());
        buf[16..24].copy_from_slice(&self.capacity().to_le_bytes());
        for (slot, value) in self.header.iter().enumerate() {
            let at = 24 + slot * 4;
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_file_header(&mut self, buf: &[u8]) -> Result<u64> {
        if &buf[0..8] != MAGIC {
            return Err(GraphError::Corruption(format!(
                "invalid store magic in {}",
                self.path.display()
            )));
        }
        let version = u32::from_le_bytes(buf[8..12].try_into().expect("slice is 4 bytes"));
        if version != FORMAT_VERSION {
            return Err(GraphError::Corruption(format!(
                "unsupported store format version {version} in {}",
                self.path.display()
            )));
        }
        let segment_size =
            u32::from_le_bytes(buf[12..16].try_into().expect("slice is 4 bytes")) as usize;
        if segment_size == 0 || segment_size % 4 != 0 {
            return Err(GraphError::Corruption(format!(
                "invalid segment size {segment_size} in {}",
                self.path.display()
            )));
        }
        if self.segment_size_configured && segment_size != self.segment_size {
            return Err(GraphError::Corruption(format!(
                "segment size mismatch: configured {}, stored {segment_size}",
                self.segment_size
            )));
        }
        let capacity = u64::from_le_bytes(buf[16..24].try_into().expect("slice is 8 bytes"));
        for slot in 0..HEADER_SLOTS {
            let at = 24 + slot * 4;
            self.header[slot] =
                i32::from_le_bytes(buf[at..at + 4].try_into().expect("slice is 4 bytes"));
        }
        self.version = version;
        self.segment_size = segment_size;
        Ok(capacity)
    }
}

impl Storable for DataAccess {
    fn create_new(&mut self, bytes: u64) -> Result<()> {
        if self.initialized {
            return Err(GraphError::InvalidState(format!(
                "store {} is already initialized",
                self.path.display()
            )));
        }
        let target = self.segments_for(bytes) * self.segment_size as u64;
        match &mut self.backing {
            Backing::Ram { segments } => {
                let ints = self.segment_size / 4;
                for _ in 0..target / self.segment_size as u64 {
                    segments.push(vec![0i32; ints].into_boxed_slice());
                }
            }
            Backing::Mmap { file, map } => {
                let handle = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.path)?;
                handle.set_len(HEADER_BYTES + target)?;
                *map = Some(unsafe { MmapMut::map_mut(&handle)? });
                *file = Some(handle);
            }
        }
        self.version = FORMAT_VERSION;
        self.initialized = true;
        Ok(())
    }

    fn load_existing(&mut self) -> Result<bool> {
        if self.initialized {
            return Err(GraphError::InvalidState(format!(
                "store {} is already initialized",
                self.path.display()
            )));
        }
        if !self.path.exists() {
            return Ok(false);
        }

        if matches!(self.backing, Backing::Ram { .. }) {
            let mut handle = File::open(&self.path)?;
            let mut header_buf = vec![0u8; HEADER_BYTES as usize];
            handle.read_exact(&mut header_buf).map_err(|_| {
                GraphError::Corruption(format!("truncated header in {}", self.path.display()))
            })?;
            let capacity = self.read_file_header(&header_buf)?;
            let file_len = handle.metadata()?.len();
            if file_len < HEADER_BYTES + capacity {
                return Err(GraphError::Corruption(format!(
                    "truncated payload in {}: expected {} bytes, found {}",
                    self.path.display(),
                    HEADER_BYTES + capacity,
                    file_len
                )));
            }
            let ints = self.segment_size / 4;
            let mut segments = Vec::new();
            let mut raw = vec![0u8; self.segment_size];
            for _ in 0..capacity / self.segment_size as u64 {
                handle.read_exact(&mut raw)?;
                let mut segment = vec![0i32; ints].into_boxed_slice();
                for (word, chunk) in segment.iter_mut().zip(raw.chunks_exact(4)) {
                    *word = i32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes"));
                }
                segments.push(segment);
            }
            self.backing = Backing::Ram { segments };
        } else {
            let handle = OpenOptions::new().read(true).write(true).open(&self.path)?;
            let file_len = handle.metadata()?.len();
            if file_len < HEADER_BYTES {
                return Err(GraphError::Corruption(format!(
                    "truncated header in {}",
                    self.path.display()
                )));
            }
            let mapped = unsafe { MmapMut::map_mut(&handle)? };
            let header_buf = mapped[..HEADER_BYTES as usize].to_vec();
            let capacity = self.read_file_header(&header_buf)?;
            if file_len < HEADER_BYTES + capacity {
                return Err(GraphError::Corruption(format!(
                    "truncated payload in {}: expected {} bytes, found {}",
                    self.path.display(),
                    HEADER_BYTES + capacity,
                    file_len
                )));
            }
            self.backing = Backing::Mmap {
                file: Some(handle),
                map: Some(mapped),
            };
        }
        self.initialized = true;
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(GraphError::InvalidState("store is not initialized".into()));
        }
        let mut header_buf = vec![0u8; HEADER_BYTES as usize];
        self.write_file_header(&mut header_buf);
        match &mut self.backing {
            Backing::Ram { segments } => {
                let file = File::create(&self.path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(&header_buf)?;
                let mut raw = Vec::with_capacity(self.segment_size);
                for segment in segments.iter() {
                    raw.clear();
                    for word in segment.iter() {
                        raw.extend_from_slice(&word.to_le_bytes());
                    }
                    writer.write_all(&raw)?;
                }
                writer.flush()?;
                writer.get_ref().sync_data()?;
            }
            Backing::Mmap { map, .. } => {
                let map = map.as_mut().expect("store is not initialized");
                map[..HEADER_BYTES as usize].copy_from_slice(&header_buf);
                map.flush()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backing {
            Backing::Ram { segments } => segments.clear(),
            Backing::Mmap { file, map } => {
                if let Some(map) = map.take() {
                    map.flush()?;
                }
                file.take();
            }
        }
        self.initialized = false;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        match &self.backing {
            Backing::Ram { segments } => segments.len() as u64 * self.segment_size as u64,
            Backing::Mmap { map, .. } => map
                .as_ref()
                .map(|m| m.len() as u64 - HEADER_BYTES)
                .unwrap_or(0),
        }
    }
}
