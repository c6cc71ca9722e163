//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Validation is left to the caller so that further layers (command-line
//! flags) can be applied first.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, RelaySettings};

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

/// An environment override that was set but could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub key: &'static str,
    /// Raw value as found.
    pub value: String,
}

impl fmt::Display for RejectedOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.key, self.value)
    }
}

/// Settings after the file and environment layers, not yet validated.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedSettings {
    /// Merged settings.
    pub settings: RelaySettings,
    /// Overrides that were ignored. Loading runs before logging is set up,
    /// so the caller reports these once a subscriber exists.
    pub rejected: Vec<RejectedOverride>,
}

/// Resolve the settings file path: `$RELAY_CONFIG`, else `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from `path`, then apply overrides read through `lookup`
/// (usually `|name| std::env::var(name).ok()`).
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LoadedSettings> {
    let mut settings = read_file_layer(path)?;
    let rejected = apply_overrides(&mut settings, lookup);
    Ok(LoadedSettings { settings, rejected })
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply overrides read through `lookup`, returning the ones that were ignored.
///
/// `PORT` is honoured for platform compatibility; `RELAY_PORT` wins when both
/// are set. Empty values are treated as unset; out-of-range or malformed
/// values are left out and reported back.
pub fn apply_overrides(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<RejectedOverride> {
    let mut env = Env {
        lookup,
        rejected: Vec::new(),
    };
    let server = &mut settings.server;

    if let Some(v) = env.u16("PORT", 1, u16::MAX) {
        server.port = v;
    }
    if let Some(v) = env.u16("RELAY_PORT", 1, u16::MAX) {
        server.port = v;
    }
    if let Some(v) = env.string("RELAY_HOST") {
        server.host = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_CONNECTIONS", 0, 1_000_000) {
        server.max_connections = v;
    }
    if let Some(v) = env.u64("RELAY_HEARTBEAT_INTERVAL", 0, 3_600) {
        server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("RELAY_HEARTBEAT_TIMEOUT", 0, 86_400) {
        server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_MESSAGE_SIZE", 1, 256 * 1024 * 1024) {
        server.max_message_size = v;
    }
    if let Some(v) = env.usize("RELAY_OUTBOUND_BUFFER", 1, 65_536) {
        server.outbound_buffer = v;
    }
    if let Some(v) = env.u64("RELAY_SEND_TIMEOUT_MS", 1, 600_000) {
        server.send_timeout_ms = v;
    }

    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(format) = env.parsed("RELAY_LOG_FORMAT", |v| v.parse::<LogFormat>().ok()) {
        settings.logging.format = format;
    }

    env.rejected
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
    rejected: Vec<RejectedOverride>,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(
        &mut self,
        name: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(val.as_str());
        if result.is_none() {
            self.rejected.push(RejectedOverride {
                key: name,
                value: val,
            });
        }
        result
    }

    fn u16(&mut self, name: &'static str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, |v| parse_u16_range(v, min, max))
    }

    fn u64(&mut self, name: &'static str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn usize(&mut self, name: &'static str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max))
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
