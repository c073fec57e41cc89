//! Byte-level storage capability.
//!
//! [`StateStore`](crate::StateStore) is the only consumer. Implementations
//! must make `write_durable` return only after the data is on stable
//! storage.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Raw file operations the state store builds its atomic save from.
pub trait Storage {
    /// Read a whole file. `Ok(None)` if it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Create or truncate `path`, write `bytes`, and force them to disk.
    fn write_durable(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Remove a file. Removing a missing file is not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Rename `from` to `to`. `to` is expected not to exist.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create `dir` and its parents if missing.
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Force directory metadata (the rename) to disk where supported.
    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        let _ = dir;
        Ok(())
    }
}

/// [`Storage`] on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_durable(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    #[cfg(unix)]
    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        File::open(dir)?.sync_all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(FsStorage.read(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.json");
        FsStorage.write_durable(&path, b"{}").unwrap();
        assert_eq!(FsStorage.read(&path).unwrap().unwrap(), b"{}");
    }

    #[test]
    fn write_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.json");
        FsStorage.write_durable(&path, b"long content").unwrap();
        FsStorage.write_durable(&path, b"x").unwrap();
        assert_eq!(FsStorage.read(&path).unwrap().unwrap(), b"x");
    }

    #[test]
    fn remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(FsStorage.remove(&dir.path().join("gone")).is_ok());
    }

    #[test]
    fn rename_moves_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        FsStorage.write_durable(&from, b"1").unwrap();
        FsStorage.rename(&from, &to).unwrap();
        assert!(!from.exists());
        assert!(to.exists());
    }

    #[test]
    fn sync_dir_succeeds() {
        let dir = TempDir::new().unwrap();
        assert!(FsStorage.sync_dir(dir.path()).is_ok());
    }
}
