//! TOML configuration for the Day Zero lab backend.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! the game frontend expects. See [`load_config`] for the validation rules
//! applied after parsing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::telemetry::window::parse_window_strict;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./data/lab_docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins allowed by CORS. A single `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Extra mount point for the router, used when the service sits behind
    /// a gateway that forwards `/api/backend/...` unchanged.
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_true")]
    pub allow_reset: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            base_path: String::new(),
            allow_reset: true,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_scenario")]
    pub default_scenario: String,
    #[serde(default = "default_window")]
    pub default_window: String,
    #[serde(default = "default_summary_limit")]
    pub summary_limit: i64,
    #[serde(default = "default_timeseries_limit")]
    pub timeseries_limit: i64,
    #[serde(default = "default_list_limit")]
    pub default_list_limit: i64,
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: i64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_scenario: default_scenario(),
            default_window: default_window(),
            summary_limit: default_summary_limit(),
            timeseries_limit: default_timeseries_limit(),
            default_list_limit: default_list_limit(),
            max_list_limit: default_max_list_limit(),
        }
    }
}

pub const DEFAULT_SCENARIO_ID: &str = "dayzero-utility-outage";

fn default_scenario() -> String {
    DEFAULT_SCENARIO_ID.to_string()
}
fn default_window() -> String {
    "24h".to_string()
}
fn default_summary_limit() -> i64 {
    5000
}
fn default_timeseries_limit() -> i64 {
    20000
}
fn default_list_limit() -> i64 {
    50
}
fn default_max_list_limit() -> i64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// All-defaults configuration pointing at the given database file.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            corpus: CorpusConfig::default(),
            server: ServerConfig::default(),
            telemetry: TelemetryConfig::default(),
            log: LogConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.telemetry;
        if t.summary_limit < 1 {
            anyhow::bail!("telemetry.summary_limit must be >= 1");
        }
        if t.timeseries_limit < 1 {
            anyhow::bail!("telemetry.timeseries_limit must be >= 1");
        }
        if t.default_list_limit < 1 {
            anyhow::bail!("telemetry.default_list_limit must be >= 1");
        }
        if t.default_list_limit > t.max_list_limit {
            anyhow::bail!(
                "telemetry.default_list_limit ({}) must not exceed telemetry.max_list_limit ({})",
                t.default_list_limit,
                t.max_list_limit
            );
        }
        if parse_window_strict(&t.default_window).is_none() {
            anyhow::bail!(
                "telemetry.default_window '{}' is not a window like 15m, 24h or 7d",
                t.default_window
            );
        }
        if t.default_scenario.trim().is_empty() {
            anyhow::bail!("telemetry.default_scenario must not be empty");
        }

        if self.log.level.parse::<tracing::Level>().is_err() {
            anyhow::bail!(
                "Unknown log level: '{}'. Must be trace, debug, info, warn, or error.",
                self.log.level
            );
        }

        let base = &self.server.base_path;
        if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
            anyhow::bail!(
                "server.base_path must start with '/' and must not end with '/' (got '{}')",
                base
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_db_section_required() {
        let cfg: Config = toml::from_str("[db]\npath = \"./lab.sqlite\"\n").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.telemetry.default_scenario, DEFAULT_SCENARIO_ID);
        assert_eq!(cfg.telemetry.summary_limit, 5000);
        assert_eq!(cfg.corpus.include_globs, vec!["**/*.md"]);
        assert!(cfg.server.allow_reset);
    }

    #[test]
    fn test_example_config_parses() {
        let cfg: Config = toml::from_str(include_str!("../config/dayzero.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert_eq!(cfg.telemetry.max_list_limit, 500);
    }

    #[test]
    fn test_rejects_bad_window_and_level() {
        let mut cfg = Config::minimal("x.sqlite");
        cfg.telemetry.default_window = "soon".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::minimal("x.sqlite");
        cfg.log.level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_list_limits() {
        let mut cfg = Config::minimal("x.sqlite");
        cfg.telemetry.default_list_limit = 600;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_base_path_shape() {
        let mut cfg = Config::minimal("x.sqlite");
        cfg.server.base_path = "/api/backend".into();
        cfg.validate().unwrap();
        cfg.server.base_path = "api/".into();
        assert!(cfg.validate().is_err());
    }
}
