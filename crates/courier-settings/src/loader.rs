//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `COURIER_*` environment overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Command-line flags are applied by the binary after loading.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{CourierSettings, OverflowPolicy};

/// Resolve the default settings file path (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Read and merge the file layer only.
fn read_settings_file(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply `COURIER_*` environment variable overrides.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// [`apply_env_overrides`] passes the process environment; tests pass a map.
pub fn apply_overrides_from<F>(settings: &mut CourierSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("COURIER_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64("COURIER_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("COURIER_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = env.u64("COURIER_WRITE_TIMEOUT_MS", 10, 600_000) {
        settings.server.write_timeout_ms = v;
    }
    if let Some(v) = env.usize("COURIER_OUTBOUND_BUFFER", 1, 65_536) {
        settings.server.outbound_buffer = v;
    }
    if let Some(v) = env.usize("COURIER_MAX_MESSAGE_SIZE", 64, 16 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.bool("COURIER_CLOSE_SUPERSEDED") {
        settings.server.close_superseded = v;
    }

    // ── Queue ───────────────────────────────────────────────────────
    if let Some(v) = env.usize("COURIER_QUEUE_MAX_PER_USER", 1, 10_000_000) {
        settings.queue.max_per_user = Some(v);
    }
    if let Some(v) = env.string("COURIER_QUEUE_OVERFLOW") {
        match parse_overflow(&v) {
            Some(p) => settings.queue.overflow = p,
            None => warn!(key = "COURIER_QUEUE_OVERFLOW", value = %v, "invalid overflow policy, ignoring"),
        }
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("COURIER_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = env.u64("COURIER_DB_POOL_SIZE", 1, 64) {
        // bounded above by 64
        settings.store.pool_size = u32::try_from(v).unwrap_or(64);
    }
    if let Some(v) = env.u64("COURIER_STORE_APPEND_TIMEOUT_MS", 10, 600_000) {
        settings.store.append_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("COURIER_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Check constraints that span fields or that serde cannot express.
pub fn validate(settings: &CourierSettings) -> Result<()> {
    let server = &settings.server;
    if server.heartbeat_interval_ms == 0 {
        return Err(SettingsError::invalid("server.heartbeatIntervalMs", "must be positive"));
    }
    if server.heartbeat_timeout_ms < server.heartbeat_interval_ms {
        return Err(SettingsError::invalid(
            "server.heartbeatTimeoutMs",
            format!(
                "{} is shorter than heartbeatIntervalMs ({})",
                server.heartbeat_timeout_ms, server.heartbeat_interval_ms
            ),
        ));
    }
    if server.write_timeout_ms == 0 {
        return Err(SettingsError::invalid("server.writeTimeoutMs", "must be positive"));
    }
    if server.outbound_buffer == 0 {
        return Err(SettingsError::invalid("server.outboundBuffer", "must be positive"));
    }
    if settings.queue.max_per_user == Some(0) {
        return Err(SettingsError::invalid("queue.maxPerUser", "must be positive when set"));
    }
    if settings.store.pool_size == 0 {
        return Err(SettingsError::invalid("store.poolSize", "must be positive"));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

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

/// Parse an overflow policy name. Accepts `drop_oldest`/`drop-oldest` and `reject`.
pub fn parse_overflow(val: &str) -> Option<OverflowPolicy> {
    match val.to_lowercase().replace('-', "_").as_str() {
        "drop_oldest" => Some(OverflowPolicy::DropOldest),
        "reject" => Some(OverflowPolicy::Reject),
        _ => None,
    }
}

// ── Variable readers ────────────────────────────────────────────────────────

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

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = (self.lookup)(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_settings_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, CourierSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "queue": {"maxPerUser": 3, "overflow": "reject"}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.queue.max_per_user, Some(3));
        assert_eq!(settings.queue.overflow, OverflowPolicy::Reject);
        assert_eq!(settings.store.db_path, "courier.db");
    }

    #[test]
    fn load_null_max_per_user_keeps_unbounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"queue": {"maxPerUser": null}}"#).unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.queue.max_per_user, None);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();

        assert!(matches!(
            read_settings_file(&path),
            Err(SettingsError::Json(_))
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = CourierSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("COURIER_HOST", "127.0.0.1"),
                ("COURIER_PORT", "9001"),
                ("COURIER_CLOSE_SUPERSEDED", "off"),
                ("COURIER_QUEUE_MAX_PER_USER", "100"),
                ("COURIER_QUEUE_OVERFLOW", "reject"),
                ("COURIER_DB_PATH", "/var/lib/courier/db.sqlite"),
                ("COURIER_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9001);
        assert!(!s.server.close_superseded);
        assert_eq!(s.queue.max_per_user, Some(100));
        assert_eq!(s.queue.overflow, OverflowPolicy::Reject);
        assert_eq!(s.store.db_path, "/var/lib/courier/db.sqlite");
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = CourierSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("COURIER_PORT", "99999"),
                ("COURIER_CLOSE_SUPERSEDED", "maybe"),
                ("COURIER_QUEUE_OVERFLOW", "drop_newest"),
                ("COURIER_HOST", ""),
                ("COURIER_DB_POOL_SIZE", "0"),
            ]),
        );
        assert_eq!(s, CourierSettings::default());
    }

    #[test]
    fn no_overrides_is_noop() {
        let mut s = CourierSettings::default();
        apply_overrides_from(&mut s, env(&[]));
        assert_eq!(s, CourierSettings::default());
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn defaults_validate() {
        assert!(validate(&CourierSettings::default()).is_ok());
    }

    #[test]
    fn timeout_shorter_than_interval_is_invalid() {
        let mut s = CourierSettings::default();
        s.server.heartbeat_interval_ms = 10_000;
        s.server.heartbeat_timeout_ms = 5_000;
        assert!(matches!(
            validate(&s),
            Err(SettingsError::Invalid { key: "server.heartbeatTimeoutMs", .. })
        ));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let mut s = CourierSettings::default();
        s.queue.max_per_user = Some(0);
        assert!(matches!(
            validate(&s),
            Err(SettingsError::Invalid { key: "queue.maxPerUser", .. })
        ));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "FALSE"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("0", 0, 65535), Some(0));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u64_range("50", 100, 1000), None);
        assert_eq!(parse_u64_range("abc", 100, 1000), None);
        assert_eq!(parse_usize_range("10", 1, 10), Some(10));
    }

    #[test]
    fn parse_overflow_names() {
        assert_eq!(parse_overflow("drop_oldest"), Some(OverflowPolicy::DropOldest));
        assert_eq!(parse_overflow("Drop-Oldest"), Some(OverflowPolicy::DropOldest));
        assert_eq!(parse_overflow("REJECT"), Some(OverflowPolicy::Reject));
        assert_eq!(parse_overflow("block"), None);
    }
}
