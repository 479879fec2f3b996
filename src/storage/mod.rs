//! Storage for archive records
//!
//! Records are addressed by keys relative to a storage root, of the form
//! `<host>/<path>/<signature>.har`. The proxy and the refresher only talk to
//! the [`RecordStore`] trait so tests can run against [`MemoryStore`].

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use std::path::{Path, PathBuf};

use crate::Result;

/// File extension of stored archive records
pub const RECORD_EXTENSION: &str = "har";

/// Narrow get/put/delete/list interface over stored records
pub trait RecordStore: Send + Sync {
    /// Whether a record exists under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried
    fn exists(&self, key: &Path) -> Result<bool>;

    /// Raw bytes of the record under `key`
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if absent, or an I/O error
    fn get(&self, key: &Path) -> Result<Vec<u8>>;

    /// Write `bytes` under `key`, replacing any previous record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    fn put(&self, key: &Path, bytes: &[u8]) -> Result<()>;

    /// Remove the record under `key`
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if absent, or an I/O error
    fn delete(&self, key: &Path) -> Result<()>;

    /// Every record key below `prefix`, sorted lexicographically
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be enumerated
    fn list(&self, prefix: &Path) -> Result<Vec<PathBuf>>;
}

fn is_record(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
}
