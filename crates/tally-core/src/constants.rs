//! Shared constants.

/// Default cap on stored sessions before retention kicks in.
pub const DEFAULT_MAX_SESSIONS: usize = 200;

/// Legacy on-disk spelling of an unknown wall-clock time.
///
/// Older journals wrote this string in place of a timestamp. It is accepted
/// on read and never written.
pub const LEGACY_UNSYNCED_MARKER: &str = "(unsynced)";

/// Wire format for wall-clock timestamps (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Default floor below which the host clock is not trusted.
///
/// An unset real-time clock boots somewhere around the epoch; anything
/// earlier than this is treated as "time unknown".
pub const DEFAULT_TRUSTED_AFTER: &str = "2024-01-01T00:00:00Z";

/// [`DEFAULT_TRUSTED_AFTER`] as Unix seconds.
pub const DEFAULT_TRUSTED_AFTER_UNIX: i64 = 1_704_067_200;
