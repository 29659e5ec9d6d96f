//! Configuration for the fixity engine.
//!
//! Loaded from a TOML file where every section is optional:
//!
//! ```toml
//! [storage]
//! backend = "filesystem"
//! root = "/srv/archive"
//!
//! [ledger]
//! path = "/var/lib/fixity/ledger.redb"
//!
//! [schedule]
//! base_months = 5
//! base_days = 14
//! jitter_days = 30
//!
//! [checksum]
//! algorithm = "md5"
//!
//! [verification]
//! failure_policy = "hold"
//!
//! [daemon]
//! listen = "127.0.0.1:8787"
//! container_prefix = "preservation-"
//!
//! [notifications]
//! webhook_url = "https://hooks.example.org/fixity"
//! deployment = "prod"
//! ```
//!
//! The parsed [`FixityConfig`] is passed explicitly to every constructor;
//! nothing reads configuration from ambient state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::{DEFAULT_MAX_OBJECT_SIZE, DigestAlgorithm};
use crate::reliability::RetryConfig;
use crate::schedule::{
    DEFAULT_BASE_DAYS, DEFAULT_BASE_MONTHS, DEFAULT_JITTER_DAYS, JitteredScheduler,
};
use crate::verifier::FailurePolicy;

/// Config file name looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "fixity.toml";

/// Default per-user data directory (`<data_dir>/fixity`).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fixity")
}

/// Default config file location (`<config_dir>/fixity/fixity.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fixity").join(CONFIG_FILE_NAME))
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixityConfig {
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub schedule: ScheduleConfig,
    pub checksum: ChecksumConfig,
    pub verification: VerificationConfig,
    pub daemon: DaemonConfig,
    pub notifications: NotificationsConfig,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Redb,
    Memory,
}

/// Where object bytes are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: ObjectBackend,
    /// Root directory for the filesystem backend; containers are its subdirectories.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: ObjectBackend::default(),
            root: default_data_dir().join("objects"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub backend: StateBackend,
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: default_data_dir().join("ledger.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub backend: StateBackend,
    pub path: PathBuf,
    pub base_months: u32,
    pub base_days: u32,
    /// Jitter days are drawn from `0..jitter_days`.
    pub jitter_days: u32,
    /// How often the expiry watcher polls the schedule store.
    pub poll_interval_secs: u64,
    /// Expired entries taken per poll batch.
    pub batch_size: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: default_data_dir().join("schedule.redb"),
            base_months: DEFAULT_BASE_MONTHS,
            base_days: DEFAULT_BASE_DAYS,
            jitter_days: DEFAULT_JITTER_DAYS,
            poll_interval_secs: 60,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksumConfig {
    pub algorithm: DigestAlgorithm,
    /// Bytes.
    pub max_object_size: u64,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    /// Triggers processed at once.
    pub max_concurrency: usize,
    /// Pending triggers buffered before the HTTP API reports back-pressure.
    pub queue_capacity: usize,
    /// Deposit triggers for containers not starting with this prefix are ignored.
    pub container_prefix: Option<String>,
    /// Serve Prometheus metrics on this address when set.
    pub metrics_listen: Option<SocketAddr>,
    /// Run the expiry watcher alongside the HTTP API.
    pub watch_schedule: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            max_concurrency: 8,
            queue_capacity: 1024,
            container_prefix: None,
            metrics_listen: None,
            watch_schedule: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    /// Label included in every notification, e.g. the environment name.
    pub deployment: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            deployment: None,
            timeout_secs: 10,
        }
    }
}

/// Re-delivery of transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl FixityConfig {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// contains unknown keys or mistyped values.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path`, or from the default location if it exists, or fall
    /// back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or discovered file fails to load.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load_from(path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn scheduler(&self) -> JitteredScheduler {
        JitteredScheduler::new(
            self.schedule.base_months,
            self.schedule.base_days,
            self.schedule.jitter_days,
        )
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.retry.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    /// Parsed webhook URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn webhook_url(&self) -> Result<Option<url::Url>> {
        let Some(raw) = &self.notifications.webhook_url else {
            return Ok(None);
        };
        let url = url::Url::parse(raw).with_context(|| format!("Invalid webhook_url: {raw}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("webhook_url must use http or https (got: {})", url.scheme());
        }
        Ok(Some(url))
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found if any check fails.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Storage
        if self.storage.backend == ObjectBackend::Filesystem {
            if !self.storage.root.exists() {
                warnings.push(format!(
                    "Storage root does not exist: {}\n  \
                     Every deposit will be recorded as a failure until it is created",
                    self.storage.root.display()
                ));
            } else if !self.storage.root.is_dir() {
                errors.push(format!(
                    "storage.root is not a directory: {}",
                    self.storage.root.display()
                ));
            }
        }

        // 2. State stores
        if self.ledger.backend == StateBackend::Memory {
            warnings.push(
                "ledger.backend = \"memory\": checksum records are lost on exit".to_string(),
            );
        }
        if self.schedule.backend == StateBackend::Memory {
            warnings.push(
                "schedule.backend = \"memory\": pending verifications are lost on exit"
                    .to_string(),
            );
        }
        if self.ledger.backend == StateBackend::Redb
            && self.schedule.backend == StateBackend::Redb
            && self.ledger.path == self.schedule.path
        {
            errors.push(format!(
                "ledger.path and schedule.path must differ (both: {})",
                self.ledger.path.display()
            ));
        }

        // 3. Schedule
        if self.schedule.base_months == 0 && self.schedule.base_days == 0 {
            errors.push(
                "schedule.base_months and schedule.base_days cannot both be 0".to_string(),
            );
        }
        if self.schedule.jitter_days == 0 {
            warnings.push(
                "schedule.jitter_days is 0: objects deposited together will come due within the same day"
                    .to_string(),
            );
        }
        if self.schedule.poll_interval_secs == 0 {
            errors.push("schedule.poll_interval_secs must be at least 1".to_string());
        }
        if self.schedule.batch_size == 0 {
            errors.push("schedule.batch_size must be at least 1".to_string());
        }

        // 4. Checksum
        if self.checksum.max_object_size == 0 {
            errors.push("checksum.max_object_size cannot be 0".to_string());
        } else if self.checksum.max_object_size > DEFAULT_MAX_OBJECT_SIZE {
            warnings.push(format!(
                "checksum.max_object_size {} exceeds the default of {DEFAULT_MAX_OBJECT_SIZE} bytes\n  \
                 Very large objects may not finish within a bounded time",
                self.checksum.max_object_size
            ));
        }

        // 5. Daemon
        if self.daemon.max_concurrency == 0 {
            errors.push("daemon.max_concurrency must be at least 1".to_string());
        }
        if self.daemon.queue_capacity == 0 {
            errors.push("daemon.queue_capacity must be at least 1".to_string());
        }
        if let Some(prefix) = &self.daemon.container_prefix
            && prefix.contains('/')
        {
            errors.push(format!(
                "daemon.container_prefix cannot contain '/': {prefix}"
            ));
        }
        if let Some(metrics) = self.daemon.metrics_listen
            && metrics == self.daemon.listen
        {
            errors.push(format!(
                "daemon.metrics_listen must differ from daemon.listen (both: {metrics})"
            ));
        }

        // 6. Notifications
        if let Err(e) = self.webhook_url() {
            errors.push(format!("{e:#}"));
        }
        if self.notifications.timeout_secs == 0 {
            errors.push("notifications.timeout_secs must be at least 1".to_string());
        }

        // 7. Retry
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            errors.push(format!(
                "retry.initial_delay_ms ({}) cannot exceed retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            ));
        }

        // 8. Logging
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            errors.push(format!(
                "logging.level is not a valid filter '{}': {e}",
                self.logging.level
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
