//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/convopipe/config.toml`, then
//! overridden by `CONVOPIPE_*` environment variables, then by CLI flags.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/convopipe/` (~/.config/convopipe/)
//! - State/Logs: `$XDG_STATE_HOME/convopipe/` (~/.local/state/convopipe/)
//!
//! ```toml
//! date = "2026-01-03"
//! write_sanitized = true
//!
//! [storage]
//! backend = "s3"
//! bucket = "my-bucket"
//!
//! [classifier]
//! enabled = true
//! model_id = "eu.amazon.nova-micro-v1:0"
//! ```

use crate::error::{Error, Result};
use crate::types::StorageKind;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "CONVOPIPE_";

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

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Date to process; today (UTC) when unset
    #[serde(default)]
    pub date: Option<NaiveDate>,

    /// Also publish the sanitized events
    #[serde(default)]
    pub write_sanitized: bool,

    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Conversation classification
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Query service configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Storage backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Backend type (`local` or `s3`)
    #[serde(default)]
    pub backend: StorageKind,

    /// Root directory for the local backend
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Bucket for the S3 backend
    pub bucket: Option<String>,

    /// Region for the S3 backend
    #[serde(default = "default_storage_region")]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::default(),
            base_path: default_base_path(),
            bucket: None,
            region: default_storage_region(),
        }
    }
}

impl StorageConfig {
    /// Validate backend-specific requirements
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageKind::S3 && is_blank(self.bucket.as_deref()) {
            return Err(Error::Config(
                "storage.bucket is required when storage.backend = \"s3\"".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./local_data")
}

fn default_storage_region() -> String {
    "us-east-1".to_string()
}

/// Classifier configuration
///
/// When `enabled` is false the pipeline runs in bypass mode and never calls
/// the inference endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Call the inference endpoint (false = bypass mode)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inference region
    #[serde(default = "default_classifier_region")]
    pub region: String,

    /// Model or inference profile id
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Endpoint override (defaults to the regional runtime endpoint)
    pub endpoint: Option<String>,

    /// API key (can also use env var AWS_BEARER_TOKEN_BEDROCK)
    pub api_key: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Concurrent inference calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: default_classifier_region(),
            model_id: default_model_id(),
            endpoint: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
        }
    }
}

impl ClassifierConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.region.trim().is_empty() {
            return Err(Error::Config(
                "classifier.region is required when classifier is enabled".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(Error::Config(
                "classifier.model_id is required when classifier is enabled".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::Config(
                "classifier.concurrency must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(Error::Config(
                "classifier timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint base URL without trailing slash
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }

    /// API key from config, falling back to the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("AWS_BEARER_TOKEN_BEDROCK").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_classifier_region() -> String {
    "eu-north-1".to_string()
}

fn default_model_id() -> String {
    "eu.amazon.nova-micro-v1:0".to_string()
}

fn default_connect_timeout() -> u64 {
    2
}

fn default_read_timeout() -> u64 {
    5
}

fn default_max_retries() -> usize {
    2
}

fn default_concurrency() -> usize {
    8
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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

/// Query service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", key, value)))
}

/// Parse a `YYYY-MM-DD` date. Rejects other shapes even if chrono would accept them.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    let well_formed = value.len() == 10
        && value
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !well_formed {
        return Err(Error::Config(format!(
            "date must be in YYYY-MM-DD format, got {:?}",
            value
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| Error::Config(format!("invalid date {:?}: {}", value, e)))
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
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply `CONVOPIPE_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    ///
    /// `lookup` receives the full variable name (with [`ENV_PREFIX`]).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((name, value)) = get("STORAGE") {
            self.storage.backend = value
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", name, e)))?;
        }
        if let Some((_, value)) = get("DATE") {
            self.date = Some(parse_date(&value)?);
        }
        if let Some((_, value)) = get("BASE_PATH") {
            self.storage.base_path = PathBuf::from(value);
        }
        if let Some((_, value)) = get("S3_BUCKET") {
            self.storage.bucket = Some(value);
        }
        if let Some((_, value)) = get("S3_REGION") {
            self.storage.region = value;
        }
        if let Some((name, value)) = get("WRITE_SANITIZED") {
            self.write_sanitized = parse_bool(&name, &value)?;
        }
        if let Some((_, value)) = get("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some((name, value)) = get("LLM_CLASSIFICATION") {
            self.classifier.enabled = parse_bool(&name, &value)?;
        }
        if let Some((_, value)) = get("LLM_REGION") {
            self.classifier.region = value;
        }
        if let Some((_, value)) = get("LLM_MODEL_ID") {
            self.classifier.model_id = value;
        }
        if let Some((name, value)) = get("LLM_CONNECT_TIMEOUT") {
            self.classifier.connect_timeout_secs = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = get("LLM_READ_TIMEOUT") {
            self.classifier.read_timeout_secs = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = get("LLM_MAX_RETRIES") {
            self.classifier.max_retries = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = get("LLM_CONCURRENCY") {
            self.classifier.concurrency = parse_number(&name, &value)?;
        }
        Ok(())
    }

    /// Check every mode-specific requirement. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.classifier.validate()?;
        Ok(())
    }

    /// Date this run processes
    pub fn run_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/convopipe/config.toml` (~/.config/convopipe/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("convopipe").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/convopipe/` (~/.local/state/convopipe/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("convopipe")
    }

    /// Returns the log file path prefix
    ///
    /// Daily rotation appends the date: `convopipe.log.YYYY-MM-DD`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("convopipe.log")
    }
}
