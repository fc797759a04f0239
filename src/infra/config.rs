//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::services::presence::{EntryPolicy, PresenceSettings};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_entry_policy")]
    pub entry_policy: EntryPolicy,
    #[serde(default = "default_appear_threshold")]
    pub appear_threshold: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_disappear_ms")]
    pub disappear_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            entry_policy: default_entry_policy(),
            appear_threshold: default_appear_threshold(),
            window_ms: default_window_ms(),
            disappear_ms: default_disappear_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_entry_policy() -> EntryPolicy {
    EntryPolicy::Confirmed
}

fn default_appear_threshold() -> u32 {
    3
}

fn default_window_ms() -> u64 {
    2_000
}

fn default_disappear_ms() -> u64 {
    10_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSection {
    /// Sweep cadence; must be no coarser than the smallest disappear/cooldown
    /// the deployment wants honored precisely
    #[serde(default = "default_sweep_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self { interval_ms: default_sweep_interval_ms() }
    }
}

fn default_sweep_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressSection {
    /// File path for event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressSection {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "asistencia.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub egress: EgressSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    entry_policy: EntryPolicy,
    appear_threshold: u32,
    window_ms: u64,
    disappear_ms: u64,
    cooldown_ms: u64,
    sweep_interval_ms: u64,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            entry_policy: toml_config.engine.entry_policy,
            appear_threshold: toml_config.engine.appear_threshold,
            window_ms: toml_config.engine.window_ms,
            disappear_ms: toml_config.engine.disappear_ms,
            cooldown_ms: toml_config.engine.cooldown_ms,
            sweep_interval_ms: toml_config.sweep.interval_ms,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine the config file path: an explicit --config value wins,
    /// then the CONFIG_FILE environment variable, then the default.
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the given path first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Engine tuning derived from the config
    pub fn presence_settings(&self) -> PresenceSettings {
        PresenceSettings {
            entry_policy: self.entry_policy,
            appear_threshold: self.appear_threshold,
            window_ms: self.window_ms,
            disappear_ms: self.disappear_ms,
            cooldown_ms: self.cooldown_ms,
        }
    }

    // Getters for all config fields
    pub fn entry_policy(&self) -> EntryPolicy {
        self.entry_policy
    }

    pub fn appear_threshold(&self) -> u32 {
        self.appear_threshold
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn disappear_ms(&self) -> u64 {
        self.disappear_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn sweep_interval_ms(&self) -> u64 {
        self.sweep_interval_ms
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.entry_policy(), EntryPolicy::Confirmed);
        assert_eq!(config.appear_threshold(), 3);
        assert_eq!(config.window_ms(), 2_000);
        assert_eq!(config.disappear_ms(), 10_000);
        assert_eq!(config.cooldown_ms(), 30_000);
        assert_eq!(config.sweep_interval_ms(), 500);
        assert_eq!(config.egress_file(), "asistencia.jsonl");
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    // One test so CONFIG_FILE manipulation never interleaves with a
    // parallel test reading the same variable
    #[test]
    fn test_resolve_config_path_precedence() {
        env::set_var("CONFIG_FILE", "config/from_env.toml");
        // Explicit path wins over the environment
        assert_eq!(
            Config::resolve_config_path(Some("config/planta.toml")),
            "config/planta.toml"
        );
        assert_eq!(Config::resolve_config_path(None), "config/from_env.toml");

        env::remove_var("CONFIG_FILE");
        assert_eq!(Config::resolve_config_path(None), "config/dev.toml");
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let toml_config: TomlConfig =
            toml::from_str("[engine]\nentry_policy = \"immediate\"\n").unwrap();
        let config = Config::from_toml(toml_config, "inline");

        assert_eq!(config.entry_policy(), EntryPolicy::Immediate);
        // Untouched fields keep their defaults
        assert_eq!(config.cooldown_ms(), 30_000);
        assert_eq!(config.sweep_interval_ms(), 500);
    }
}
