//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/docpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/docpulse/` (~/.config/docpulse/)
//! - Data: `$XDG_DATA_HOME/docpulse/` (~/.local/share/docpulse/)
//! - State/Logs: `$XDG_STATE_HOME/docpulse/` (~/.local/state/docpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Engagement scoring thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Subscription plan flags (consulted by presentation layers only)
    #[serde(default)]
    pub plan: PlanConfig,
}

/// Duration thresholds for the engagement scorer.
///
/// Intent signal cut-offs are fixed constants shared across the codebase
/// and deliberately not configurable; only the duration normalization
/// points are.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScoringConfig {
    /// Seconds of document dwell that earn the full duration sub-score
    #[serde(default = "default_document_high_engagement_secs")]
    pub document_high_engagement_secs: u32,

    /// Seconds on a track-site that earn the full duration sub-score
    #[serde(default = "default_tracksite_high_engagement_secs")]
    pub tracksite_high_engagement_secs: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            document_high_engagement_secs: default_document_high_engagement_secs(),
            tracksite_high_engagement_secs: default_tracksite_high_engagement_secs(),
        }
    }
}

fn default_document_high_engagement_secs() -> u32 {
    120
}

fn default_tracksite_high_engagement_secs() -> u32 {
    60
}

/// Subscription tier of the account this installation reports for.
///
/// The analytics core always computes every field; the tier only decides
/// which fields the CLI renders and exports.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Business,
}

impl PlanTier {
    /// Whether per-session engagement columns may be exposed.
    pub fn exposes_engagement(&self) -> bool {
        matches!(self, PlanTier::Pro | PlanTier::Business)
    }

    /// Whether fine-grained attention columns (idle time, tab switches)
    /// may be exposed.
    pub fn exposes_attention_detail(&self) -> bool {
        matches!(self, PlanTier::Business)
    }
}

/// Plan configuration block.
#[derive(Debug, Deserialize, Default)]
pub struct PlanConfig {
    /// Subscription tier
    #[serde(default)]
    pub tier: PlanTier,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/docpulse/config.toml` (~/.config/docpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("docpulse").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/docpulse/` (~/.local/share/docpulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("docpulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/docpulse/` (~/.local/state/docpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("docpulse")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/docpulse/data.db` (~/.local/share/docpulse/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/docpulse/docpulse.log` (~/.local/state/docpulse/docpulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("docpulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path
    /// behavior before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scoring.document_high_engagement_secs, 120);
        assert_eq!(config.scoring.tracksite_high_engagement_secs, 60);
        assert_eq!(config.plan.tier, PlanTier::Free);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[scoring]
document_high_engagement_secs = 180

[plan]
tier = "business"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.scoring.document_high_engagement_secs, 180);
        assert_eq!(config.scoring.tracksite_high_engagement_secs, 60);
        assert_eq!(config.plan.tier, PlanTier::Business);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_tier_gating() {
        assert!(!PlanTier::Free.exposes_engagement());
        assert!(PlanTier::Pro.exposes_engagement());
        assert!(!PlanTier::Pro.exposes_attention_detail());
        assert!(PlanTier::Business.exposes_attention_detail());
    }
}
