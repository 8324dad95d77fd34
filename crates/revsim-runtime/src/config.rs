//! Station configuration: a JSON file with serde-backed defaults.
//!
//! A missing file at the default location yields the built-in defaults; an
//! explicitly passed path must exist. Malformed JSON is a startup error,
//! never silently ignored.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use revsim_core::countdown::MIN_COUNTDOWN_MS;
use revsim_core::lag::DEFAULT_LAG_MS;
use revsim_core::session::MAX_BATCH_SIZE;
use revsim_core::types::TimeoutPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "revsim.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub lag: LagConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Per-item time budget in seconds; floor-clamped to 0.1 s when applied.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    /// "acknowledge" (freeze until a key) or "auto" (advance unattended).
    #[serde(default)]
    pub policy: TimeoutPolicy,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            policy: TimeoutPolicy::default(),
        }
    }
}

impl TimeoutConfig {
    /// Budget in milliseconds, clamped to the countdown minimum.
    pub fn duration_ms(&self) -> u64 {
        let ms = (self.duration_secs.max(0.0) * 1_000.0) as u64;
        ms.max(MIN_COUNTDOWN_MS)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_batch_count")]
    pub default_count: i32,
    #[serde(default)]
    pub cycling_enabled: bool,
    #[serde(default = "default_cycling_sequence")]
    pub cycling_sequence: Vec<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_count: default_batch_count(),
            cycling_enabled: false,
            cycling_sequence: default_cycling_sequence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LagConfig {
    #[serde(default = "default_lag_ms")]
    pub duration_ms: u64,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_lag_ms(),
        }
    }
}

fn default_duration_secs() -> f64 {
    10.0
}

fn default_batch_count() -> i32 {
    MAX_BATCH_SIZE as i32
}

fn default_cycling_sequence() -> Vec<u32> {
    vec![1, 2, 3, 4, 5, 6]
}

fn default_lag_ms() -> u64 {
    DEFAULT_LAG_MS
}

impl StationConfig {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist and parse. Without one,
    /// a missing `revsim.json` falls back to defaults.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                if Path::new(DEFAULT_CONFIG_PATH).exists() {
                    Self::from_file(DEFAULT_CONFIG_PATH)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {path}"))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse config {path}"))
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = StationConfig::default();
        assert_eq!(cfg.timeout.duration_ms(), 10_000);
        assert_eq!(cfg.timeout.policy, TimeoutPolicy::AcknowledgeRequired);
        assert_eq!(cfg.batch.default_count, 6);
        assert!(!cfg.batch.cycling_enabled);
        assert_eq!(cfg.batch.cycling_sequence, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(cfg.lag.duration_ms, 3_000);
    }

    #[test]
    fn empty_object_parses_to_defaults() {
        let cfg: StationConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg.timeout.duration_ms(), 10_000);
        assert_eq!(cfg.lag.duration_ms, 3_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: StationConfig = serde_json::from_str(
            r#"{"timeout": {"duration_secs": 2.5, "policy": "auto"}}"#,
        )
        .expect("parse");
        assert_eq!(cfg.timeout.duration_ms(), 2_500);
        assert_eq!(cfg.timeout.policy, TimeoutPolicy::AutoAdvance);
        assert_eq!(cfg.batch.default_count, 6);
    }

    #[test]
    fn duration_is_floor_clamped() {
        let cfg: StationConfig =
            serde_json::from_str(r#"{"timeout": {"duration_secs": 0.01}}"#).expect("parse");
        assert_eq!(cfg.timeout.duration_ms(), MIN_COUNTDOWN_MS);

        let cfg: StationConfig =
            serde_json::from_str(r#"{"timeout": {"duration_secs": -5.0}}"#).expect("parse");
        assert_eq!(cfg.timeout.duration_ms(), MIN_COUNTDOWN_MS);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<StationConfig, _> =
            serde_json::from_str(r#"{"timeoutt": {"duration_secs": 1.0}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn cycling_config_parses() {
        let cfg: StationConfig = serde_json::from_str(
            r#"{"batch": {"cycling_enabled": true, "cycling_sequence": [1, 3]}}"#,
        )
        .expect("parse");
        assert!(cfg.batch.cycling_enabled);
        assert_eq!(cfg.batch.cycling_sequence, vec![1, 3]);
    }
}
