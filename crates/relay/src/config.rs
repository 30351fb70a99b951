//! Configuration loading and validation

use anyhow::{Context, Result, bail};
use relay_core::BackendDescriptor;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Cache capacity used when none (or a non-positive one) is configured
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Main configuration structure
///
/// Also accepts the flat legacy layout (`Cache`, `CacheSize` and
/// `[[Applications]]` at the top level), which is migrated on load.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backends: Vec<BackendDescriptor>,

    /// Legacy backend list
    #[serde(default, rename = "Applications")]
    pub legacy_applications: Vec<LegacyApplication>,
    /// Legacy cache switch
    #[serde(default, rename = "Cache")]
    pub legacy_cache: Option<bool>,
    /// Legacy cache capacity
    #[serde(default, rename = "CacheSize")]
    pub legacy_cache_size: Option<i64>,
}

/// Proxy listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum number of cached responses; non-positive values fall back to the default
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    /// Lifetime of responses stored without any max-age
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_capacity(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

/// Outbound backend call configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Whole-request deadline in seconds, 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect deadline in seconds, 0 disables it
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        non_zero_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }
}

/// Admin listener configuration (health, metrics, cache management)
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    #[serde(default = "default_admin_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            bind_address: default_admin_bind_address(),
            port: default_admin_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Backend entry in the legacy layout
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyApplication {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Port", default)]
    pub port: String,
    #[serde(rename = "TLS", default)]
    pub tls: bool,
    #[serde(rename = "Alive", default)]
    pub alive: Option<bool>,
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cache_enabled() -> bool {
    true
}

fn default_capacity() -> i64 {
    DEFAULT_CACHE_CAPACITY as i64
}

fn default_ttl_secs() -> u64 {
    relay_core::DEFAULT_HORIZON_SECS
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_admin_enabled() -> bool {
    true
}

fn default_admin_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Parse, migrate and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.migrate_legacy()?;
        config.validate()?;
        Ok(config)
    }

    /// Fold the legacy flat layout into the sectioned one.
    ///
    /// A legacy file only caches when it says `Cache = true`.
    fn migrate_legacy(&mut self) -> Result<()> {
        if !self.legacy_applications.is_empty() {
            if self.backends.is_empty() {
                warn!("Migrating legacy [[Applications]] to [[backends]] format");
                self.cache.enabled = self.legacy_cache.unwrap_or(false);
                for app in self.legacy_applications.drain(..) {
                    let port = if app.port.trim().is_empty() {
                        0
                    } else {
                        app.port.trim().parse::<u16>().with_context(|| {
                            format!("Invalid port {:?} for application {}", app.port, app.ip)
                        })?
                    };

                    self.backends.push(BackendDescriptor {
                        host: app.ip,
                        port,
                        tls: app.tls,
                        alive: app.alive.unwrap_or(true),
                    });
                }
            } else {
                warn!("Ignoring legacy [[Applications]] since [[backends]] is set");
                self.legacy_applications.clear();
            }
        }

        if let Some(enabled) = self.legacy_cache.take() {
            self.cache.enabled = enabled;
        }
        if let Some(size) = self.legacy_cache_size.take() {
            self.cache.capacity = size;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("At least one backend must be configured");
        }
        if self.backends.iter().any(|b| b.host.trim().is_empty()) {
            bail!("Backend host must not be empty");
        }
        Ok(())
    }

    /// Cache capacity with non-positive values replaced by the default
    pub fn cache_capacity(&self) -> usize {
        if self.cache.capacity <= 0 {
            warn!(
                "Cache capacity {} is not positive, using default {}",
                self.cache.capacity, DEFAULT_CACHE_CAPACITY
            );
            DEFAULT_CACHE_CAPACITY
        } else {
            self.cache.capacity as usize
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig::default(),
            backends: vec![BackendDescriptor::new("127.0.0.1", 8081)],
            legacy_applications: vec![],
            legacy_cache: None,
            legacy_cache_size: None,
        }
    }
}
