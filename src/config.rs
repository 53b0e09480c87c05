use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the REST API server
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7408
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the filesystem object store
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Default bucket for project registry, progress records, and step content.
    /// Individual projects may override this with their own bucket.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_storage_root() -> String {
    ".waypoint/store".to_string()
}

fn default_bucket() -> String {
    "workflows".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            bucket: default_bucket(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root domain under which per-user session names are published
    /// (a session for user `u` is reachable at `u.<root_domain>`)
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
    /// Upper bound on any session's runtime in minutes; project values
    /// above this are clamped down to it
    #[serde(default = "default_max_runtime")]
    pub max_runtime_minutes: u64,
    /// TTL for published session address records
    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u32,
}

fn default_root_domain() -> String {
    "sandbox.localdomain".to_string()
}

fn default_max_runtime() -> u64 {
    60
}

fn default_dns_ttl() -> u32 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_domain: default_root_domain(),
            max_runtime_minutes: default_max_runtime(),
            dns_ttl: default_dns_ttl(),
        }
    }
}

/// Network placement handed to the compute provider when launching tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_subnet")]
    pub subnet: String,
    #[serde(default = "default_security_group")]
    pub security_group: String,
    /// Sessions must be publicly addressable for DNS publication to make sense
    #[serde(default = "default_assign_public_address")]
    pub assign_public_address: bool,
}

fn default_subnet() -> String {
    "subnet-default".to_string()
}

fn default_security_group() -> String {
    "sg-default".to_string()
}

fn default_assign_public_address() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            subnet: default_subnet(),
            security_group: default_security_group(),
            assign_public_address: default_assign_public_address(),
        }
    }
}

/// Bounded fixed-delay retry settings shared by task launch, address
/// discovery, and cluster deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: usize,
    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    20_000
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// How often the local watchdog backend checks for due rules, in milliseconds
    #[serde(default = "default_watchdog_tick_ms")]
    pub tick_ms: u64,
}

fn default_watchdog_tick_ms() -> u64 {
    1_000
}

impl WatchdogConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_watchdog_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write logs to a file under the storage root instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the primary config file
    pub fn primary_config_path() -> PathBuf {
        PathBuf::from(".waypoint/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so waypoint works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Primary config next to the store
        let primary = Self::primary_config_path();
        if primary.exists() {
            builder = builder.add_source(config::File::from(primary));
        }

        // User config in ~/.config/waypoint/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("waypoint").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with WAYPOINT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("WAYPOINT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Absolute path to the storage root
    pub fn storage_root(&self) -> PathBuf {
        let path = PathBuf::from(&self.storage.root);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Directory for log files when file logging is enabled
    pub fn logs_path(&self) -> PathBuf {
        self.storage_root().join("logs")
    }
}
