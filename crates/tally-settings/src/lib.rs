//! # tally-settings
//!
//! Layered configuration for the tally uptime recorder.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **User file**: `~/.tally/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TALLY_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! let settings = tally_settings::load_settings().unwrap_or_default();
//! println!("collector: {}", settings.sync.ingest_url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = TallySettings::default();
        let path = settings_path();
        assert!(path.ends_with(".tally/settings.json"));
    }
}
