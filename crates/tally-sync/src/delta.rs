//! Wire payload for one session update.

use serde::{Deserialize, Serialize};
use tally_core::{DeviceIdentity, SessionRecord, SessionStatus};

/// JSON body posted to the collector.
///
/// ```json
/// {
///   "device_uuid":   "0b9f3c1e-6a2d-4e8f-9c71-5d3a2b1f0e4c",
///   "session_start": "2025-10-23T18:00:00Z",
///   "run_seconds":   1200,
///   "last_update":   "2025-10-23T18:20:00Z",
///   "status":        "open",
///   "msg_id":        "0b9f3c1e-...:2025-10-23T18:00:00Z:1200"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDelta {
    /// Device identity.
    pub device_uuid: String,
    /// Session start, UTC.
    pub session_start: String,
    /// Current run length in seconds.
    pub run_seconds: u64,
    /// Most recent update, UTC.
    pub last_update: String,
    /// Session status.
    pub status: SessionStatus,
    /// Idempotency key, see [`message_id`].
    pub msg_id: String,
}

impl SessionDelta {
    /// Build the delta for `record`.
    ///
    /// `None` while either timestamp is still unknown; the collector cannot
    /// accept the marker.
    pub fn for_record(identity: &DeviceIdentity, record: &SessionRecord) -> Option<Self> {
        let session_start = record.start.to_wire()?;
        let last_update = record.last_update.to_wire()?;
        let msg_id = message_id(identity, &session_start, record.run_seconds);
        Some(Self {
            device_uuid: identity.to_string(),
            session_start,
            run_seconds: record.run_seconds,
            last_update,
            status: record.status,
            msg_id,
        })
    }
}

/// Idempotency key for one delivered value.
///
/// Deterministic in `(identity, session_start, run_seconds)`: a retransmitted
/// delta carries the same key and the collector can drop it.
pub fn message_id(identity: &DeviceIdentity, session_start: &str, run_seconds: u64) -> String {
    format!("{identity}:{session_start}:{run_seconds}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
