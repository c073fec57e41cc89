//! Collector configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the collector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` picks a free port).
    pub port: u16,
    /// When set, `POST /ingest` requires `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            bearer_token: None,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl IngestConfig {
    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8080");
        assert!(cfg.bearer_token.is_none());
        assert_eq!(cfg.max_body_bytes, 65_536);
    }
}
