//! Filesystem-backed record store

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{is_record, RecordStore};
use crate::{Result, VcrError};

/// Stores records as files below a root directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self, dir: &Path, keys: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if entry.file_type()?.is_dir() {
                self.walk(&path, keys)?;
            } else if is_record(&path) {
                if let Ok(key) = path.strip_prefix(&self.root) {
                    keys.push(key.to_path_buf());
                }
            }
        }
        Ok(())
    }
}

impl RecordStore for FsStore {
    fn exists(&self, key: &Path) -> Result<bool> {
        Ok(self.root.join(key).try_exists()?)
    }

    fn get(&self, key: &Path) -> Result<Vec<u8>> {
        std::fs::read(self.root.join(key)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VcrError::RecordNotFound(key.to_path_buf()),
            _ => VcrError::Io(e),
        })
    }

    fn put(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(key);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, bytes)?;

        debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn delete(&self, key: &Path) -> Result<()> {
        std::fs::remove_file(self.root.join(key)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VcrError::RecordNotFound(key.to_path_buf()),
            _ => VcrError::Io(e),
        })
    }

    fn list(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        self.walk(&dir, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let key = Path::new("example.com/foo/bar/abc.har");

        assert!(!store.exists(key).unwrap());

        store.put(key, b"{\"log\":{}}").unwrap();
        assert!(store.exists(key).unwrap());
        assert!(temp_dir.path().join(key).is_file());
        assert_eq!(store.get(key).unwrap(), b"{\"log\":{}}");

        store.delete(key).unwrap();
        assert!(!store.exists(key).unwrap());
    }

    #[test]
    fn test_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let key = Path::new("example.com/missing.har");

        assert!(matches!(store.get(key), Err(VcrError::RecordNotFound(_))));
        assert!(matches!(store.delete(key), Err(VcrError::RecordNotFound(_))));
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());

        store.put(Path::new("example.com/z/1.har"), b"{}").unwrap();
        store.put(Path::new("example.com/a/b/2.har"), b"{}").unwrap();
        store.put(Path::new("example.com/a/1.har"), b"{}").unwrap();
        store.put(Path::new("other.com/a/1.har"), b"{}").unwrap();
        std::fs::write(temp_dir.path().join("example.com/a/notes.txt"), b"x").unwrap();

        let keys = store.list(Path::new("example.com")).unwrap();
        assert_eq!(
            keys,
            vec![
                PathBuf::from("example.com/a/1.har"),
                PathBuf::from("example.com/a/b/2.har"),
                PathBuf::from("example.com/z/1.har"),
            ]
        );
    }

    #[test]
    fn test_list_unknown_host_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path().join("never-created"));

        assert!(store.list(Path::new("example.com")).unwrap().is_empty());
    }
}
