//! Configuration management for message-export
//!
//! This module handles loading, parsing, and validating configuration:
//! - Configuration files (TOML format)
//! - Default values for every setting
//!
//! Command-line arguments override individual values after loading.
//! Durations are stored as (fractional) seconds and exposed as [`Duration`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Memory monitor configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Progress reporting configuration
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of records per output chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Number of records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pacing delay per fetched batch in seconds
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,

    /// Upper bound of the pacing delay in seconds
    #[serde(default = "default_rate_limit_cap")]
    pub rate_limit_cap: f64,

    /// Maximum attempts per page request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Consult the memory monitor every N records
    #[serde(default = "default_memory_check_every")]
    pub memory_check_every: usize,

    /// Output file format
    #[serde(default = "default_format")]
    pub format: ExportFormat,

    /// Number of recent records sampled for the total estimate
    #[serde(default = "default_estimate_sample_size")]
    pub estimate_sample_size: usize,

    /// Upper bound of the total estimate
    #[serde(default = "default_estimate_cap")]
    pub estimate_cap: u64,
}

/// Output file formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values with a UTF-8 byte order mark
    ///
    /// Opens cleanly in spreadsheet applications.
    Csv,

    /// One JSON object per line
    JsonL,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff base for network failures in seconds
    #[serde(default = "default_network_base_delay")]
    pub network_base_delay: f64,

    /// Backoff base for timeouts in seconds
    #[serde(default = "default_timeout_base_delay")]
    pub timeout_base_delay: f64,

    /// Upper bound of any backoff in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,

    /// Wait used when a rate limit carries no retry-after hint
    #[serde(default = "default_rate_limit_wait")]
    pub default_rate_limit_wait: f64,
}

/// Memory monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Usage percentage that triggers a warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Usage percentage that aborts runs
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    /// Minimum seconds between real samples
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,

    /// Length of the trend window
    #[serde(default = "default_trend_samples")]
    pub trend_samples: usize,
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Per-actor cooldown between export requests in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown: f64,

    /// Reject every request while set
    #[serde(default)]
    pub maintenance: bool,

    /// Maximum number of runs active at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

/// Progress reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum seconds between unforced progress lines
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,

    /// Emit only when the processed count is a multiple of this
    #[serde(default = "default_progress_batch_size")]
    pub batch_size: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_chunk_size() -> usize {
    10_000
}

fn default_page_size() -> usize {
    100
}

fn default_rate_limit_delay() -> f64 {
    0.25
}

fn default_rate_limit_cap() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout() -> f64 {
    30.0
}

fn default_memory_check_every() -> usize {
    100
}

fn default_format() -> ExportFormat {
    ExportFormat::Csv
}

fn default_estimate_sample_size() -> usize {
    1000
}

fn default_estimate_cap() -> u64 {
    1_000_000
}

fn default_network_base_delay() -> f64 {
    1.0
}

fn default_timeout_base_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    30.0
}

fn default_rate_limit_wait() -> f64 {
    5.0
}

fn default_warning_threshold() -> f64 {
    70.0
}

fn default_critical_threshold() -> f64 {
    85.0
}

fn default_check_interval() -> f64 {
    60.0
}

fn default_trend_samples() -> usize {
    5
}

fn default_cooldown() -> f64 {
    5.0
}

fn default_max_concurrent() -> usize {
    4
}

fn default_update_interval() -> f64 {
    2.0
}

fn default_progress_batch_size() -> u64 {
    100
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            page_size: default_page_size(),
            rate_limit_delay: default_rate_limit_delay(),
            rate_limit_cap: default_rate_limit_cap(),
            max_retries: default_max_retries(),
            timeout: default_timeout(),
            memory_check_every: default_memory_check_every(),
            format: default_format(),
            estimate_sample_size: default_estimate_sample_size(),
            estimate_cap: default_estimate_cap(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_base_delay: default_network_base_delay(),
            timeout_base_delay: default_timeout_base_delay(),
            max_delay: default_max_delay(),
            default_rate_limit_wait: default_rate_limit_wait(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
            check_interval: default_check_interval(),
            trend_samples: default_trend_samples(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            maintenance: false,
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            batch_size: default_progress_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
            }
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults
    ///
    /// An explicitly given path must exist. Without one, the default path is
    /// used when present and defaults otherwise.
    ///
    /// # Arguments
    /// * `path` - Optional explicit configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("message-export")
            .join("config.toml")
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        positive("export.chunk_size", self.export.chunk_size)?;
        positive("export.page_size", self.export.page_size)?;
        positive("export.max_retries", self.export.max_retries as usize)?;
        positive("export.memory_check_every", self.export.memory_check_every)?;
        positive("memory.trend_samples", self.memory.trend_samples)?;
        positive("admission.max_concurrent", self.admission.max_concurrent)?;
        positive("progress.batch_size", self.progress.batch_size as usize)?;

        seconds("export.rate_limit_delay", self.export.rate_limit_delay)?;
        seconds("export.rate_limit_cap", self.export.rate_limit_cap)?;
        seconds("export.timeout", self.export.timeout)?;
        seconds("retry.network_base_delay", self.retry.network_base_delay)?;
        seconds("retry.timeout_base_delay", self.retry.timeout_base_delay)?;
        seconds("retry.max_delay", self.retry.max_delay)?;
        seconds("retry.default_rate_limit_wait", self.retry.default_rate_limit_wait)?;
        seconds("memory.check_interval", self.memory.check_interval)?;
        seconds("admission.cooldown", self.admission.cooldown)?;
        seconds("progress.update_interval", self.progress.update_interval)?;

        let warning = self.memory.warning_threshold;
        let critical = self.memory.critical_threshold;
        if !(warning > 0.0 && warning < critical) {
            return Err(invalid("memory.warning_threshold", warning));
        }
        if critical > 100.0 {
            return Err(invalid("memory.critical_threshold", critical));
        }

        Ok(())
    }

    /// Get per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.export.timeout)
    }

    /// Get pacing delay per batch as Duration
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.export.rate_limit_delay)
    }

    /// Get pacing cap as Duration
    pub fn rate_limit_cap(&self) -> Duration {
        Duration::from_secs_f64(self.export.rate_limit_cap)
    }

    /// Get per-actor cooldown as Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.admission.cooldown)
    }

    /// Get memory check interval as Duration
    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.memory.check_interval)
    }

    /// Get progress update interval as Duration
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs_f64(self.progress.update_interval)
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::ExporterError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn positive(field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(invalid(field, value));
    }
    Ok(())
}

fn seconds(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, value));
    }
    Ok(())
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl ExportFormat {
    /// File extension for artifacts of this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::JsonL => "jsonl",
        }
    }
}
