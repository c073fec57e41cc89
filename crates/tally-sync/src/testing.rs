//! Scripted [`Transport`] for tests.
//!
//! Answers come from a queue; when it runs dry the transport either repeats a
//! fixed status or fails like an unreachable host. Every request is recorded.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::delta::SessionDelta;
use crate::errors::TransportError;
use crate::transport::Transport;

/// A request seen by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// Target URL.
    pub url: String,
    /// Raw body.
    pub body: Vec<u8>,
    /// Headers as sent.
    pub headers: Vec<(String, String)>,
    /// Timeout passed by the caller.
    pub timeout: Duration,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as a delta.
    pub fn delta(&self) -> Option<SessionDelta> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Transport that replays a fixed script of answers.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<u16, TransportError>>>,
    fallback: Mutex<Option<u16>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Replay `responses` in order, then fail every request.
    pub fn new(responses: impl IntoIterator<Item = Result<u16, TransportError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `status`.
    pub fn always(status: u16) -> Self {
        let transport = Self::new([]);
        transport.set_fallback(Some(status));
        transport
    }

    /// Transport that behaves like a host with no route.
    pub fn offline() -> Self {
        Self::new([])
    }

    /// Append answers to the script.
    pub fn push(&self, response: Result<u16, TransportError>) {
        self.script.lock().push_back(response);
    }

    /// Status returned once the script is exhausted; `None` fails instead.
    pub fn set_fallback(&self, status: Option<u16>) {
        *self.fallback.lock() = status;
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Bodies of every request, decoded.
    pub fn deltas(&self) -> Vec<SessionDelta> {
        self.requests
            .lock()
            .iter()
            .filter_map(RecordedRequest::delta)
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_owned(),
            body,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            timeout,
        });

        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        match *self.fallback.lock() {
            Some(status) => Ok(status),
            None => Err(TransportError::Request("network unreachable".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
