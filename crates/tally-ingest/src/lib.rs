//! # tally-ingest
//!
//! Reference collector for tally session deltas.
//!
//! `POST /ingest` accepts one delta per request and answers
//! `200 {"acked":true,"duplicate":bool}`; malformed bodies get `400`. Repeats
//! and stale deltas are acknowledged without changing the [`Ledger`]. `GET /health` and `GET /sessions` expose what has arrived.

#![deny(unsafe_code)]

pub mod config;
pub mod ledger;
pub mod server;

pub use config::IngestConfig;
pub use ledger::{Ledger, LedgerStats, Receipt, SessionView};
pub use server::{IngestServer, ServerHandle};
