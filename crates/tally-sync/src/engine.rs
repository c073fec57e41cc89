//! One delivery pass over the journal.

use std::sync::Arc;
use std::time::Duration;

use tally_core::{DeviceIdentity, SessionRecord};
use tracing::{debug, warn};

use crate::delta::SessionDelta;
use crate::errors::DeliveryError;
use crate::transport::Transport;

/// Where to deliver and how long to wait.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Collector endpoint.
    pub ingest_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Config with no credential and a ten second timeout.
    pub fn new(ingest_url: impl Into<String>) -> Self {
        Self {
            ingest_url: ingest_url.into(),
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// The failure that ended an attempt.
#[derive(Debug)]
pub struct HaltedAt {
    /// Index of the record whose delivery failed.
    pub index: usize,
    /// What went wrong.
    pub error: DeliveryError,
}

/// Result of [`SyncEngine::attempt`].
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Records whose ack counter advanced.
    pub delivered: usize,
    /// Records passed over because a timestamp is still unknown.
    pub skipped_unsynced: usize,
    /// Set when a delivery failed and the pass stopped.
    pub halted: Option<HaltedAt>,
}

impl SyncOutcome {
    /// At least one acknowledgement was recorded.
    #[must_use]
    pub fn made_progress(&self) -> bool {
        self.delivered > 0
    }

    /// The pass stopped on a transport failure rather than a collector answer.
    #[must_use]
    pub fn link_failed(&self) -> bool {
        self.halted.as_ref().is_some_and(|h| h.error.is_link_failure())
    }
}

/// Delivers session deltas in journal order.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create an engine over `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass over `sessions`, oldest first.
    ///
    /// Fully acknowledged records are passed over, as are records with an
    /// unknown timestamp (they stay pending until backfilled). Every other
    /// record gets one request; a 2xx answer advances its ack counter to the
    /// delivered `run_seconds`. The first failure ends the pass and leaves
    /// every later record untouched, so a newer record is never acknowledged
    /// while an older one is still outstanding.
    ///
    /// Only `acked_run_seconds` is modified. The caller persists the journal.
    pub async fn attempt(
        &self,
        identity: &DeviceIdentity,
        sessions: &mut [SessionRecord],
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        for (index, record) in sessions.iter_mut().enumerate() {
            if record.is_fully_acked() {
                continue;
            }
            let Some(delta) = SessionDelta::for_record(identity, record) else {
                outcome.skipped_unsynced += 1;
                continue;
            };

            match self.deliver(&delta).await {
                Ok(()) => {
                    record.acknowledge(delta.run_seconds);
                    outcome.delivered += 1;
                    debug!(
                        msg_id = %delta.msg_id,
                        status = delta.status.as_str(),
                        run_seconds = delta.run_seconds,
                        "delta acknowledged"
                    );
                }
                Err(error) => {
                    warn!(index, msg_id = %delta.msg_id, error = %error, "delivery failed, ending sync pass");
                    outcome.halted = Some(HaltedAt { index, error });
                    break;
                }
            }
        }

        outcome
    }

    async fn deliver(&self, delta: &SessionDelta) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(delta)?;
        let bearer = self.config.bearer_token.as_deref().map(|t| format!("Bearer {t}"));

        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(value) = bearer.as_deref() {
            headers.push(("Authorization", value));
        }

        let status = self
            .transport
            .post(&self.config.ingest_url, body, &headers, self.config.timeout)
            .await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(DeliveryError::Status(status))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
