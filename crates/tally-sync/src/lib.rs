//! # tally-sync
//!
//! Store-and-forward delivery of session deltas.
//!
//! One [`SyncEngine::attempt`] walks the journal oldest-first and posts a
//! [`SessionDelta`] for every record with unacknowledged run time. The
//! first failure ends the attempt, so the collector always sees a gap-free,
//! monotonically advancing timeline per device.
//!
//! The network is reached through the [`Transport`] capability;
//! [`ReqwestTransport`] is the production implementation and
//! [`testing::ScriptedTransport`] the scripted one used in tests.

#![deny(unsafe_code)]

pub mod delta;
pub mod engine;
pub mod errors;
pub mod testing;
pub mod transport;

pub use delta::{SessionDelta, message_id};
pub use engine::{HaltedAt, SyncConfig, SyncEngine, SyncOutcome};
pub use errors::{DeliveryError, TransportError};
pub use transport::{ReqwestTransport, Transport};
