//! Retention: bound the journal by discarding delivered sessions.
//!
//! Only records that are closed *and* fully acknowledged are ever dropped,
//! oldest first. Open and undelivered records are kept even if that leaves
//! the journal above the cap; losing undelivered time is worse than a few
//! extra entries.

use tracing::{debug, warn};

use crate::journal::Journal;

/// Trim `journal` toward `max_sessions` entries.
///
/// Removes droppable records from the oldest end until the count reaches
/// the cap or no candidates remain. Relative order of every surviving record
/// is preserved. Returns the number of records removed.
pub fn prune(journal: &mut Journal, max_sessions: usize) -> usize {
    let before = journal.sessions.len();
    if before <= max_sessions {
        return 0;
    }

    let mut excess = before - max_sessions;
    journal.sessions.retain(|record| {
        if excess > 0 && record.is_droppable() {
            excess -= 1;
            false
        } else {
            true
        }
    });

    let removed = before - journal.sessions.len();
    if excess > 0 {
        warn!(
            kept = journal.sessions.len(),
            max_sessions, "journal above retention cap, remaining sessions undelivered"
        );
    }
    debug!(removed, "pruned delivered sessions");
    removed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
