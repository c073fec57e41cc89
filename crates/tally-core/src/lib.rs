//! # tally-core
//!
//! Foundation types and pure journal logic for the tally uptime recorder.
//!
//! This crate owns everything that does not touch a disk or a socket:
//!
//! - **Clock**: [`WallTime`] (`Known` / `Unknown`) and the [`ClockSource`] capability
//! - **Identity**: [`DeviceIdentity`], a canonical UUIDv4 string
//! - **Sessions**: [`SessionRecord`] and its `open` / `closed` lifecycle
//! - **Journal**: [`Journal`] with the boot, tick, close and backfill transitions
//! - **Retention**: [`retention::prune`] bounding the journal to a session cap
//! - **Backoff**: reconnect cooldown math used by the driver loop
//!
//! Persistence lives in `tally-store`, delivery in `tally-sync`.

#![deny(unsafe_code)]

pub mod backoff;
pub mod clock;
pub mod connectivity;
pub mod constants;
pub mod errors;
pub mod identity;
pub mod journal;
pub mod logging;
pub mod retention;
pub mod session;

pub use clock::{ClockSource, ManualClock, SystemClock, WallTime};
pub use connectivity::ConnectivitySignal;
pub use errors::IdentityError;
pub use identity::DeviceIdentity;
pub use journal::Journal;
pub use session::{SessionRecord, SessionStatus};
