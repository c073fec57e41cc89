//! Persisted device identity.
//!
//! The identity is stored in the journal file's `device_uuid` field, so it
//! is read from and written back through the in-memory [`Journal`] the
//! driver owns rather than from a second file.

use tally_core::{DeviceIdentity, Journal};
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::state::StateStore;
use crate::storage::Storage;

/// Settle the identity on `journal` without saving.
///
/// A persisted value is accepted only in canonical UUID form; anything else
/// (missing, a legacy device name, garbage) is replaced by a fresh UUIDv4.
/// Returns the identity and whether it was freshly generated.
pub fn ensure_identity(journal: &mut Journal) -> (DeviceIdentity, bool) {
    if let Some(raw) = journal.device_uuid.as_deref() {
        match DeviceIdentity::parse(raw) {
            Ok(identity) => return (identity, false),
            Err(e) => warn!(value = raw, "discarding persisted device identity: {e}"),
        }
    }

    let identity = DeviceIdentity::generate();
    journal.device_uuid = Some(identity.to_string());
    (identity, true)
}

/// Return the device identity, generating and persisting one if needed.
///
/// A fresh identity is saved before returning, so repeated calls after a
/// successful save return the same value.
///
/// On a save error the new identity is still set on `journal`, so the next
/// successful save persists it.
pub fn get_or_create<S: Storage>(
    store: &StateStore<S>,
    journal: &mut Journal,
) -> Result<DeviceIdentity, StoreError> {
    let (identity, generated) = ensure_identity(journal);
    if generated {
        store.save(journal)?;
        info!(device_uuid = %identity, "generated device identity");
    }
    Ok(identity)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
