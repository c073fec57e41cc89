//! Store error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Step of the atomic save that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveStage {
    /// Creating the parent directory.
    CreateDir,
    /// Writing and forcing the temporary file.
    WriteTemp,
    /// Removing the previous canonical file.
    RemoveCanonical,
    /// Renaming the temporary file into place.
    Rename,
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir => f.write_str("create state directory"),
            Self::WriteTemp => f.write_str("write temp file"),
            Self::RemoveCanonical => f.write_str("remove previous state file"),
            Self::Rename => f.write_str("rename temp file into place"),
        }
    }
}

/// Errors from reading or writing the journal file.
///
/// Read and parse errors never escape [`crate::StateStore::load`]; they are
/// logged and replaced by an empty journal. Write errors are returned from
/// [`crate::StateStore::save`] and leave the last committed file intact.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The journal could not be serialized.
    #[error("failed to serialize journal: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The state file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The state file is not a valid journal.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A step of the atomic save failed.
    #[error("failed to {stage} for {}: {source}", path.display())]
    Write {
        /// Which step failed.
        stage: SaveStage,
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
