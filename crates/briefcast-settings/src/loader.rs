//! Settings loading: compiled defaults, then the JSON file deep-merged on top,
//! then `BRIEFCAST_*` environment overrides.
//!
//! Deep merge: objects merge per key, arrays and scalars are replaced, and
//! `null` in the file keeps the default.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{BriefcastSettings, BusBackend};

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "BRIEFCAST_SETTINGS";

/// Resolve the settings file: `$BRIEFCAST_SETTINGS`, else
/// `~/.briefcast/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os(SETTINGS_PATH_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".briefcast").join("settings.json")
}

/// Load from the default path with environment overrides.
pub fn load_settings() -> Result<BriefcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with environment overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BriefcastSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults plus the file at `path`, without environment overrides.
pub fn load_file_layer(path: &Path) -> Result<BriefcastSettings> {
    let defaults = serde_json::to_value(BriefcastSettings::default())?;

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

/// Recursive deep merge of `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values that parse but cannot run.
pub fn validate(settings: &BriefcastSettings) -> Result<()> {
    if settings.server.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalMs must be greater than zero".into(),
        ));
    }
    if settings.server.outbound_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.outboundQueueCapacity must be greater than zero".into(),
        ));
    }
    if settings.bus.memory_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "bus.memoryCapacity must be greater than zero".into(),
        ));
    }
    if settings.bus.channel_prefix.is_empty() {
        return Err(SettingsError::InvalidValue(
            "bus.channelPrefix must not be empty".into(),
        ));
    }
    Ok(())
}

/// Apply `BRIEFCAST_*` overrides from the process environment.
///
/// Unparseable or out-of-range values are logged and ignored.
pub fn apply_env_overrides(settings: &mut BriefcastSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Split out so tests need not touch
/// the process environment.
pub fn apply_overrides<F>(settings: &mut BriefcastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("BRIEFCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("BRIEFCAST_PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("BRIEFCAST_HEARTBEAT_INTERVAL_MS", |s| {
        parse_u64_range(s, 100, 3_600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.parsed("BRIEFCAST_PONG_TIMEOUT_MS", |s| {
        parse_u64_range(s, 0, 3_600_000)
    }) {
        // 0 disables the check
        settings.server.pong_timeout_ms = (v > 0).then_some(v);
    }

    // ── Bus ─────────────────────────────────────────────────────────
    if let Some(v) = env.parsed("BRIEFCAST_BUS_BACKEND", parse_backend) {
        settings.bus.backend = v;
    }
    if let Some(v) = env.string("BRIEFCAST_BUS_URL") {
        settings.bus.url = Some(v);
    }
    if let Some(v) = env.string("BRIEFCAST_CHANNEL_PREFIX") {
        settings.bus.channel_prefix = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("BRIEFCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("BRIEFCAST_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `[min, max]`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a `u64` within `[min, max]`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a bus backend name (case-insensitive).
pub fn parse_backend(val: &str) -> Option<BusBackend> {
    match val.to_lowercase().as_str() {
        "memory" | "in-memory" | "inmemory" => Some(BusBackend::Memory),
        "redis" => Some(BusBackend::Redis),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
