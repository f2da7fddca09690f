use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::DriverTiming;
use crate::monitor::Thresholds;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = "agent-relay";
const CONFIG_ENV: &str = "AGENT_RELAY_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    #[serde(default = "default_screenshot_interval_secs")]
    pub screenshot_interval_secs: u64,
    #[serde(default = "default_grace_ticks")]
    pub grace_ticks: u32,
    #[serde(default = "default_idle_debounce")]
    pub idle_debounce: u32,
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,
    #[serde(default = "default_true")]
    pub auto_monitor: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverSettings {
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
    #[serde(default = "default_key_pause_millis")]
    pub key_pause_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassiveSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_passive_interval_secs")]
    pub interval_secs: u64,
    /// Start of the quiet window, hour 0-23
    #[serde(default)]
    pub quiet_start: Option<u32>,
    #[serde(default)]
    pub quiet_end: Option<u32>,
    #[serde(default = "default_presence_window_secs")]
    pub presence_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmuxSettings {
    #[serde(default = "default_tmux_program")]
    pub program: String,
    /// Panes whose title contains this (case-insensitive) are targets
    #[serde(default = "default_title_filter")]
    pub title_filter: String,
    #[serde(default = "default_history_lines")]
    pub history_lines: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadSettings {
    #[serde(default = "default_max_inline_chars")]
    pub max_inline_chars: usize,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub passive: PassiveSettings,
    #[serde(default)]
    pub tmux: TmuxSettings,
    #[serde(default)]
    pub payload: PayloadSettings,
    /// Operator-assigned names, keyed by pane id
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_poll_interval_millis() -> u64 {
    1500
}

fn default_screenshot_interval_secs() -> u64 {
    15
}

fn default_grace_ticks() -> u32 {
    5
}

fn default_idle_debounce() -> u32 {
    2
}

fn default_max_session_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_settle_millis() -> u64 {
    300
}

fn default_key_pause_millis() -> u64 {
    50
}

fn default_passive_interval_secs() -> u64 {
    3
}

fn default_presence_window_secs() -> u64 {
    600
}

fn default_tmux_program() -> String {
    "tmux".to_string()
}

fn default_title_filter() -> String {
    "claude".to_string()
}

fn default_history_lines() -> u32 {
    200
}

fn default_max_inline_chars() -> usize {
    200
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_millis: default_poll_interval_millis(),
            screenshot_interval_secs: default_screenshot_interval_secs(),
            grace_ticks: default_grace_ticks(),
            idle_debounce: default_idle_debounce(),
            max_session_secs: default_max_session_secs(),
            auto_monitor: default_true(),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            settle_millis: default_settle_millis(),
            key_pause_millis: default_key_pause_millis(),
        }
    }
}

impl Default for PassiveSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_passive_interval_secs(),
            quiet_start: None,
            quiet_end: None,
            presence_window_secs: default_presence_window_secs(),
        }
    }
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            program: default_tmux_program(),
            title_filter: default_title_filter(),
            history_lines: default_history_lines(),
        }
    }
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            max_inline_chars: default_max_inline_chars(),
            dir: None,
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval_secs)
    }

    pub fn max_session(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            grace_ticks: self.grace_ticks,
            idle_debounce: self.idle_debounce.max(1),
        }
    }
}

impl DriverSettings {
    pub fn timing(&self) -> DriverTiming {
        DriverTiming {
            settle: Duration::from_millis(self.settle_millis),
            key_pause: Duration::from_millis(self.key_pause_millis),
        }
    }
}

impl PassiveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn presence_window(&self) -> Duration {
        Duration::from_secs(self.presence_window_secs)
    }
}

/// Per-user directory for config, logs and materialized payloads
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONFIG_DIR)
}

impl Config {
    /// Load from `$AGENT_RELAY_CONFIG` or the user config directory.
    /// A missing file yields the defaults.
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILENAME)));

        match path {
            Some(path) if path.is_file() => {
                let config = Self::load_from(&path)?;
                Ok((config, Some(path)))
            }
            _ => Ok((Config::default(), None)),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.payload
            .dir
            .clone()
            .unwrap_or_else(|| data_dir().join("messages"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.monitor.screenshot_interval_secs, 15);
        assert_eq!(config.monitor.thresholds(), Thresholds::default());
        assert_eq!(config.monitor.max_session_secs, 3600);
        assert!(config.monitor.auto_monitor);
        assert_eq!(config.driver.settle_millis, 300);
        assert!(config.passive.enabled);
        assert!(config.passive.quiet_start.is_none());
        assert_eq!(config.passive.presence_window_secs, 600);
        assert_eq!(config.tmux.program, "tmux");
        assert_eq!(config.tmux.title_filter, "claude");
        assert_eq!(config.payload.max_inline_chars, 200);
        assert!(config.labels.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[monitor]
poll_interval_millis = 1000
screenshot_interval_secs = 30
grace_ticks = 8
idle_debounce = 3
max_session_secs = 600
auto_monitor = false

[driver]
settle_millis = 100
key_pause_millis = 20

[passive]
enabled = false
interval_secs = 10
quiet_start = 23
quiet_end = 7
presence_window_secs = 120

[tmux]
program = "/usr/local/bin/tmux"
title_filter = "codex"
history_lines = 500

[payload]
max_inline_chars = 80
dir = "/tmp/relay-messages"

[labels]
"%3" = "backend"
"%7" = "docs"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.grace_ticks, 8);
        assert_eq!(config.monitor.idle_debounce, 3);
        assert!(!config.monitor.auto_monitor);
        assert_eq!(config.driver.timing().settle, Duration::from_millis(100));
        assert!(!config.passive.enabled);
        assert_eq!(config.passive.quiet_start, Some(23));
        assert_eq!(config.passive.quiet_end, Some(7));
        assert_eq!(config.tmux.title_filter, "codex");
        assert_eq!(config.payload_dir(), PathBuf::from("/tmp/relay-messages"));
        assert_eq!(config.labels.get("%3").map(String::as_str), Some("backend"));
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[monitor]
screenshot_interval_secs = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.screenshot_interval_secs, 60);
        assert_eq!(config.monitor.poll_interval_millis, 1500);
        assert!(config.passive.enabled);
    }

    #[test]
    fn zero_debounce_is_clamped() {
        let config: Config = toml::from_str("[monitor]\nidle_debounce = 0\n").unwrap();
        assert_eq!(config.monitor.thresholds().idle_debounce, 1);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[labels]\n\"%1\" = \"api\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.labels.get("%1").map(String::as_str), Some("api"));
    }

    #[test]
    fn load_reports_parse_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[monitor\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
