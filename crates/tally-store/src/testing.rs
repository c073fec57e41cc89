//! Fault injection for interruption tests.
//!
//! [`FaultyStorage`] behaves like [`FsStorage`] until told to fail at a
//! given [`SaveStage`]. A failure at [`SaveStage::WriteTemp`] leaves a
//! truncated, unsynced temp file behind, which is what power loss mid-write
//! looks like.

use std::io;
use std::path::Path;

use parking_lot::Mutex;

use crate::errors::SaveStage;
use crate::storage::{FsStorage, Storage};

/// Filesystem storage that fails once at a chosen stage.
#[derive(Debug, Default)]
pub struct FaultyStorage {
    inner: FsStorage,
    fail_at: Mutex<Option<SaveStage>>,
}

impl FaultyStorage {
    /// Storage that behaves normally until [`FaultyStorage::fail_next`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation for `stage` fail.
    pub fn fail_next(&self, stage: SaveStage) {
        *self.fail_at.lock() = Some(stage);
    }

    /// Whether an armed failure has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.fail_at.lock().is_some()
    }

    fn trip(&self, stage: SaveStage) -> io::Result<()> {
        let mut armed = self.fail_at.lock();
        if *armed == Some(stage) {
            *armed = None;
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                format!("injected failure: {stage}"),
            ));
        }
        Ok(())
    }
}

impl Storage for FaultyStorage {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        self.inner.read(path)
    }

    fn write_durable(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Err(e) = self.trip(SaveStage::WriteTemp) {
            // power loss mid-write: half the bytes, never synced
            std::fs::write(path, &bytes[..bytes.len() / 2])?;
            return Err(e);
        }
        self.inner.write_durable(path, bytes)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.trip(SaveStage::RemoveCanonical)?;
        self.inner.remove(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.trip(SaveStage::Rename)?;
        self.inner.rename(from, to)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.trip(SaveStage::CreateDir)?;
        self.inner.create_dir_all(dir)
    }

    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        self.inner.sync_dir(dir)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tally_core::{Journal, ManualClock};
    use tempfile::TempDir;

    use crate::{StateStore, StoreError};

    fn committed() -> Journal {
        let mut j = Journal::new();
        let _ = j.on_boot(&ManualClock::unsynced());
        let _ = j.tick(60, &ManualClock::unsynced());
        j
    }

    fn next(mut j: Journal) -> Journal {
        let _ = j.tick(120, &ManualClock::unsynced());
        j
    }

    #[test]
    fn failure_is_one_shot() {
        let storage = FaultyStorage::new();
        storage.fail_next(SaveStage::Rename);
        assert!(storage.is_armed());
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        storage.write_durable(&a, b"x").unwrap();
        assert!(storage.rename(&a, &dir.path().join("b")).is_err());
        assert!(!storage.is_armed());
        assert!(storage.rename(&a, &dir.path().join("b")).is_ok());
    }

    #[test]
    fn interrupted_temp_write_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::with_storage(FaultyStorage::new(), dir.path().join("s.json"));
        let old = committed();
        store.save(&old).unwrap();

        store.storage().fail_next(SaveStage::WriteTemp);
        let err = store.save(&next(old.clone())).unwrap_err();
        assert_matches!(err, StoreError::Write { stage: SaveStage::WriteTemp, .. });
        assert!(store.temp_path().exists());
        assert_eq!(store.load(), old);
    }

    #[test]
    fn interrupted_remove_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::with_storage(FaultyStorage::new(), dir.path().join("s.json"));
        let old = committed();
        store.save(&old).unwrap();

        store.storage().fail_next(SaveStage::RemoveCanonical);
        assert!(store.save(&next(old.clone())).is_err());
        assert_eq!(store.load(), old);
    }

    #[test]
    fn interrupted_rename_recovers_new_from_temp() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::with_storage(FaultyStorage::new(), dir.path().join("s.json"));
        let old = committed();
        store.save(&old).unwrap();

        let new = next(old);
        store.storage().fail_next(SaveStage::Rename);
        assert!(store.save(&new).is_err());
        assert!(!store.path().exists());
        assert_eq!(store.load(), new);
    }

    #[test]
    fn save_after_interruption_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::with_storage(FaultyStorage::new(), dir.path().join("s.json"));
        store.storage().fail_next(SaveStage::WriteTemp);
        assert!(store.save(&committed()).is_err());
        assert_eq!(store.load(), Journal::default());

        let j = committed();
        store.save(&j).unwrap();
        assert_eq!(store.load(), j);
        assert!(!store.temp_path().exists());
    }
}
