//! # tally-store
//!
//! Crash-safe persistence for the session journal.
//!
//! - [`storage`]: the byte-level [`Storage`] capability and its filesystem
//!   implementation
//! - [`state`]: [`StateStore`] with `load` (never fails) and `save` (atomic
//!   write-to-temp, force, replace)
//! - [`identity`]: [`get_or_create`] for the persisted device identity
//! - [`testing`]: a fault-injecting storage wrapper for interruption tests
//!
//! # Example
//!
//! ```no_run
//! use tally_store::StateStore;
//!
//! let store = StateStore::open("/var/lib/tally/sessions.json");
//! let mut journal = store.load();
//! let id = tally_store::get_or_create(&store, &mut journal);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod state;
pub mod storage;
pub mod testing;

pub use errors::{SaveStage, StoreError};
pub use identity::{ensure_identity, get_or_create};
pub use state::StateStore;
pub use storage::{FsStorage, Storage};
