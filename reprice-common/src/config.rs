//! Configuration management for the repricing job.
//!
//! The job reads a single configuration file at `~/.reprice/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (REPRICE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `REPRICE_LOG_LEVEL` → observability.log_level
//! - `REPRICE_LOG_FORMAT` → observability.log_format
//! - `REPRICE_LOG_FILE` → observability.log_file
//! - `REPRICE_SPREADSHEET_ID` → sheets.spreadsheet_id
//! - `REPRICE_CREDENTIALS_PATH` → sheets.credentials_path
//! - `REPRICE_MARKER_COLUMN` → sheets.marker_column
//! - `REPRICE_POLICY` → selection.policy

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".reprice"),
        |dirs| dirs.home_dir().join(".reprice"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the repricing job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Spreadsheet access configuration
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Selection policy configuration
    #[serde(default)]
    pub selection: SelectionConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    ///
    /// An explicit `path` must exist; without one the default path is optional.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("REPRICE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("REPRICE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(file) = std::env::var("REPRICE_LOG_FILE") {
            self.observability.log_file = Some(file);
        }

        if let Ok(id) = std::env::var("REPRICE_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = id;
        }
        if let Ok(path) = std::env::var("REPRICE_CREDENTIALS_PATH") {
            self.sheets.credentials_path = path;
        }
        if let Ok(column) = std::env::var("REPRICE_MARKER_COLUMN") {
            self.sheets.marker_column = column.to_uppercase();
        }

        if let Ok(policy) = std::env::var("REPRICE_POLICY") {
            match policy.parse() {
                Ok(kind) => self.selection.policy = kind,
                Err(e) => tracing::warn!(value = %policy, error = %e, "Ignoring REPRICE_POLICY"),
            }
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Optional file that receives a copy of every log line.
    #[serde(default)]
    pub log_file: Option<String>,

    /// How often the log file rolls over (hourly, daily, weekly, monthly, never)
    #[serde(default = "default_log_rotation")]
    pub log_rotation: String,

    /// Rolled-over files to keep, 0 keeps every file
    #[serde(default = "default_log_retention")]
    pub log_retention: usize,

    /// Additional module targets to pin at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
            log_rotation: default_log_rotation(),
            log_retention: default_log_retention(),
            excluded_targets: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Log file path with `~` and environment variables expanded.
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_path)
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_log_rotation() -> String {
    "weekly".into()
}

fn default_log_retention() -> usize {
    8
}

// ============================================================================
// Sheets Configuration
// ============================================================================

/// Google Sheets access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Spreadsheet ID (the part of the URL between `/d/` and `/edit`)
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Path to the service-account JSON key
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    /// Zero-based tab index of the products sheet
    #[serde(default)]
    pub products_sheet: usize,

    /// Zero-based tab index of the rules sheet
    #[serde(default = "default_rules_sheet")]
    pub rules_sheet: usize,

    /// Column letter that receives the selection marker
    #[serde(default = "default_marker_column")]
    pub marker_column: String,

    /// Sheets API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            credentials_path: default_credentials_path(),
            products_sheet: 0,
            rules_sheet: default_rules_sheet(),
            marker_column: default_marker_column(),
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SheetsConfig {
    /// Credentials path with `~` and environment variables expanded.
    pub fn credentials_file(&self) -> PathBuf {
        expand_path(&self.credentials_path)
    }
}

fn default_credentials_path() -> String {
    "~/.reprice/credentials.json".into()
}

fn default_rules_sheet() -> usize {
    1
}

fn default_marker_column() -> String {
    "J".into()
}

fn default_api_base_url() -> String {
    "https://sheets.googleapis.com".into()
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Selection Configuration
// ============================================================================

/// Which selection procedure to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Every unpriced row first, then priced-and-stale, then ratio fill
    Flat,
    /// Unpriced-and-stale first, then priced-and-stale, then ratio fill
    #[default]
    PriceAware,
    /// Per-turnover-bucket staleness thresholds
    Bucketed,
    /// Unpriced first, then ratio fill, no date rule
    Global,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [Self::Flat, Self::PriceAware, Self::Bucketed, Self::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::PriceAware => "price_aware",
            Self::Bucketed => "bucketed",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown policy '{}', expected one of: flat, price_aware, bucketed, global",
                    s
                )
            })
    }
}

/// Selection policy configuration.
///
/// The numeric rules (quota, days) live on the rules sheet; this section
/// only picks the procedure and the pre-pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub policy: PolicyKind,

    /// Drop rows whose rule column is "0"
    #[serde(default)]
    pub exclude_rule: bool,

    /// Drop repeated (number, brand) pairs, first occurrence wins
    #[serde(default)]
    pub dedup: bool,

    /// Staleness threshold for buckets missing from the rules sheet
    #[serde(default)]
    pub default_bucket_days: Option<i64>,
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

// ============================================================================
// Tests
// ============================================================================
