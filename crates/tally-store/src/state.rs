//! Durable journal file.
//!
//! Save protocol:
//! 1. Serialize the whole journal.
//! 2. Write it to `<path>.tmp` and force it to stable storage.
//! 3. Remove the canonical file (some filesystems cannot rename over an
//!    existing file).
//! 4. Rename the temp file into place, then sync the directory.
//!
//! A crash at any point leaves either the previous or the new complete
//! journal readable. The only window without a canonical file is between
//! steps 3 and 4, and the temp file is complete by then, so [`StateStore::load`]
//! falls back to it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tally_core::Journal;
use tracing::{debug, warn};

use crate::errors::{SaveStage, StoreError};
use crate::storage::{FsStorage, Storage};

/// Suffix appended to the canonical path for the staging file.
const TEMP_SUFFIX: &str = ".tmp";

/// Reads and atomically writes the journal file.
#[derive(Debug)]
pub struct StateStore<S = FsStorage> {
    storage: S,
    path: PathBuf,
    temp_path: PathBuf,
}

impl StateStore<FsStorage> {
    /// A store backed by the local filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_storage(FsStorage, path)
    }
}

impl<S: Storage> StateStore<S> {
    /// A store over an arbitrary [`Storage`].
    pub fn with_storage(storage: S, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let temp_path = temp_path_for(&path);
        Self {
            storage,
            path,
            temp_path,
        }
    }

    /// Canonical file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging file path.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// The underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Load the journal. Never fails.
    ///
    /// Missing, unreadable or corrupt files yield an empty journal. If the
    /// canonical file is unusable but a complete temp file survived an
    /// interrupted save, that journal is used instead.
    pub fn load(&self) -> Journal {
        match self.try_load() {
            Ok(Some(journal)) => journal,
            Ok(None) => {
                debug!(path = %self.path.display(), "no state file, starting empty");
                Journal::default()
            }
            Err(e) => {
                warn!("{e}, starting empty");
                Journal::default()
            }
        }
    }

    /// Load with the failure reason preserved.
    ///
    /// `Ok(None)` means neither the canonical nor the temp file exists.
    pub fn try_load(&self) -> Result<Option<Journal>, StoreError> {
        let canonical = match self.read_journal(&self.path) {
            Ok(Some(journal)) => return Ok(Some(finish_load(journal))),
            other => other,
        };

        match self.read_journal(&self.temp_path) {
            Ok(Some(journal)) => {
                warn!(
                    path = %self.temp_path.display(),
                    "recovered journal from interrupted save"
                );
                Ok(Some(finish_load(journal)))
            }
            Ok(None) | Err(_) => canonical.map(|_| None),
        }
    }

    /// Atomically replace the journal file.
    ///
    /// Returns only after the new content has been forced to storage. On
    /// error the previously committed file is untouched, or (if the failure
    /// came after its removal) the complete temp file stands in for it.
    pub fn save(&self, journal: &Journal) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(journal)?;

        if let Some(parent) = self.parent_dir() {
            self.storage
                .create_dir_all(parent)
                .map_err(|e| write_error(SaveStage::CreateDir, &self.path, e))?;
        }

        self.storage
            .write_durable(&self.temp_path, &bytes)
            .map_err(|e| write_error(SaveStage::WriteTemp, &self.temp_path, e))?;

        self.storage
            .remove(&self.path)
            .map_err(|e| write_error(SaveStage::RemoveCanonical, &self.path, e))?;

        self.storage
            .rename(&self.temp_path, &self.path)
            .map_err(|e| write_error(SaveStage::Rename, &self.path, e))?;

        if let Some(parent) = self.parent_dir() {
            if let Err(e) = self.storage.sync_dir(parent) {
                warn!(dir = %parent.display(), "failed to sync state directory: {e}");
            }
        }

        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            sessions = journal.sessions.len(),
            "journal saved"
        );
        Ok(())
    }

    fn read_journal(&self, path: &Path) -> Result<Option<Journal>, StoreError> {
        let Some(bytes) = self.storage.read(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

fn write_error(stage: SaveStage, path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Write {
        stage,
        path: path.to_path_buf(),
        source,
    }
}

fn finish_load(mut journal: Journal) -> Journal {
    let _ = journal.normalize();
    journal
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
