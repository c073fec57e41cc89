//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TallySettings::default()`]
//! 2. If `~/.tally/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TALLY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TallySettings;

/// Resolve the path to the settings file (`~/.tally/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tally").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TallySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TallySettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Like [`load_settings_from_path`] with an explicit environment lookup.
pub fn load_settings_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<TallySettings> {
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(TallySettings::default()).map_err(malformed)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TallySettings = serde_json::from_value(merged).map_err(malformed)?;
    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TALLY_*` overrides read through `env`.
///
/// Integers must parse and fall within range; invalid values are ignored
/// with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut TallySettings, env: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup: &env };

    // ── State ───────────────────────────────────────────────────────
    if let Some(v) = env.string("TALLY_STATE_PATH") {
        settings.state.path = v;
    }
    if let Some(v) = env.u64("TALLY_SAVE_PERIOD_SECS", 1, 86_400) {
        settings.state.save_period_secs = v;
    }
    if let Some(v) = env.usize("TALLY_MAX_SESSIONS", 1, 100_000) {
        settings.state.max_sessions = v;
    }

    // ── Sync ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TALLY_INGEST_URL") {
        settings.sync.ingest_url = v;
    }
    if let Some(v) = env.string("TALLY_BEARER_TOKEN") {
        settings.sync.bearer_token = Some(v);
    }
    if let Some(v) = env.u64("TALLY_POST_PERIOD_SECS", 1, 3_600) {
        settings.sync.post_period_secs = v;
    }
    if let Some(v) = env.u64("TALLY_TIMEOUT_SECS", 1, 600) {
        settings.sync.timeout_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TALLY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
