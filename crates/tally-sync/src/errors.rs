//! Delivery error types.

use std::time::Duration;

use thiserror::Error;

/// The request never produced an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection, DNS, TLS or protocol failure.
    #[error("request failed: {0}")]
    Request(String),
}

/// Why a single delta was not acknowledged.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The collector answered with a non-2xx status.
    #[error("collector rejected delta with status {0}")]
    Status(u16),
    /// The request did not complete.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The delta could not be encoded.
    #[error("failed to encode delta: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Whether the failure points at the network path rather than the
    /// collector's answer.
    #[must_use]
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
