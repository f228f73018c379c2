use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::Storable;
use crate::store::DataAccess;

/// Append-with-dedup store of street names.
///
/// Names are stored UTF-32, one i32 word per scalar value, as
/// `[char_count, codepoint, ...]` records. That wastes space against UTF-8
/// but keeps every record a whole number of words, which is what the
/// word-addressed store requires. Offsets returned by [`add`](Self::add)
/// are stable for the lifetime of the storage.
pub struct NameTable {
    store: DataAccess,
    name_count: i32,
}

impl NameTable {
    pub(crate) fn new(store: DataAccess) -> Self {
        Self {
            store,
            name_count: 0,
        }
    }

    pub fn name_count(&self) -> i32 {
        self.name_count
    }

    pub(crate) fn store(&self) -> &DataAccess {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut DataAccess {
        &mut self.store
    }

    pub(crate) fn set_name_count(&mut self, count: i32) {
        self.name_count = count;
    }

    /// Appends a name and returns its word offset, or the offset of the
    /// existing record for an equal string.
    ///
    /// The dedup scan is linear over all stored names, which is acceptable
    /// for an offline build and nothing else. A rewrite should hash on
    /// insert.
    pub fn add(&mut self, name: &str) -> Result<i32> {
        let encoded: Vec<i32> = name.chars().map(|c| c as u32 as i32).collect();

        let mut offset: i64 = 0;
        for _ in 0..self.name_count {
            let size = self.store.get_int(offset as u64);
            if size as usize == encoded.len() {
                let matches = encoded
                    .iter()
                    .enumerate()
                    .all(|(i, &word)| self.store.get_int(offset as u64 + 1 + i as u64) == word);
                if matches {
                    return Ok(offset as i32);
                }
            }
            offset += i64::from(size) + 1;
        }

        if offset > i64::from(i32::MAX) {
            return Err(GraphError::InvalidState(
                "name area exceeds addressable size".into(),
            ));
        }
        self.store
            .ensure_capacity(4 * (offset as u64 + 1 + encoded.len() as u64))?;
        self.store.set_int(offset as u64, encoded.len() as i32);
        for (i, &word) in encoded.iter().enumerate() {
            self.store.set_int(offset as u64 + 1 + i as u64, word);
        }
        self.name_count += 1;
        debug!(offset, chars = encoded.len(), "names.append");
        Ok(offset as i32)
    }

    /// Decodes the name record starting at `offset`.
    pub fn get(&self, offset: i32) -> Result<String> {
        if offset < 0 {
            return Err(GraphError::InvalidArgument(format!(
                "negative name offset {offset}"
            )));
        }
        let size = self.store.get_int(offset as u64);
        if size < 0 {
            return Err(GraphError::Corruption(format!(
                "negative name length at offset {offset}"
            )));
        }
        let mut name = String::with_capacity(size as usize);
        for i in 0..size as u64 {
            let word = self.store.get_int(offset as u64 + 1 + i) as u32;
            let c = char::from_u32(word).ok_or_else(|| {
                GraphError::Corruption(format!(
                    "invalid scalar value {word:#x} in name at offset {offset}"
                ))
            })?;
            name.push(c);
        }
        Ok(name)
    }

    pub(crate) fn create_new(&mut self, bytes: u64) -> Result<()> {
        self.store.create_new(bytes)
    }

    pub(crate) fn load_existing(&mut self) -> Result<bool> {
        if !self.store.load_existing()? {
            return Ok(false);
        }
        self.name_count = self.store.get_header(0);
        Ok(true)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        let count = self.name_count;
        self.store.set_header(0, count);
        self.store.flush()
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.store.close()
    }
}
