//! In-memory record store

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::{is_record, RecordStore};
use crate::{Result, VcrError};

/// Keeps records in a concurrent map, nothing touches the disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn exists(&self, key: &Path) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn get(&self, key: &Path) -> Result<Vec<u8>> {
        self.records
            .get(key)
            .map(|bytes| bytes.clone())
            .ok_or_else(|| VcrError::RecordNotFound(key.to_path_buf()))
    }

    fn put(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        self.records.insert(key.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &Path) -> Result<()> {
        self.records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| VcrError::RecordNotFound(key.to_path_buf()))
    }

    fn list(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        let mut keys: Vec<PathBuf> = self
            .records
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix) && is_record(key))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
