//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `HP_*`
//! environment variables, and applying each layer onto a [`ScanConfig`]
//! with proper precedence rules.

use crate::error::HostProbeError;
use crate::types::{
    OutputFormat, ResolverProtocol, ScanConfig, MAX_CONCURRENCY, MIN_CONCURRENCY,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// threads = 64
/// format = "json"
/// timeout = "10s"
/// connect_timeout = "3s"
///
/// [resolver]
/// server = "1.1.1.1"
/// port = 53
/// protocol = "tcp"
/// timeout = "2s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Custom resolver for the DNS probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverFileConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Worker count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// Output format, `text` or `json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Whole-request timeout for the TLS probe (e.g. "10s", "1m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Connect and handshake timeout for the TLS probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
}

/// `[resolver]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResolverFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// `udp` or `tcp`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Per-query timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl FileConfig {
    /// Apply every value present in this file onto `config`.
    ///
    /// Files are validated on load, so parse failures here only happen for
    /// configurations built by hand.
    pub fn apply_to(&self, config: &mut ScanConfig) -> Result<(), HostProbeError> {
        if let Some(defaults) = &self.defaults {
            if let Some(threads) = defaults.threads {
                config.concurrency = threads;
            }
            if let Some(format) = &defaults.format {
                config.format = format.parse()?;
            }
            if let Some(timeout) = &defaults.timeout {
                config.request_timeout = require_timeout("defaults.timeout", timeout)?;
            }
            if let Some(timeout) = &defaults.connect_timeout {
                config.connect_timeout = require_timeout("defaults.connect_timeout", timeout)?;
            }
        }

        if let Some(resolver) = &self.resolver {
            if let Some(server) = &resolver.server {
                config.resolver.server = Some(server.clone());
            }
            if let Some(port) = resolver.port {
                config.resolver.port = port;
            }
            if let Some(protocol) = &resolver.protocol {
                config.resolver.protocol = protocol.parse()?;
            }
            if let Some(timeout) = &resolver.timeout {
                config.resolver.timeout = require_timeout("resolver.timeout", timeout)?;
            }
        }

        Ok(())
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which config files were found
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration or an error if reading, parsing or
    /// validation fails.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, HostProbeError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(HostProbeError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            HostProbeError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            HostProbeError::config(format!(
                "Failed to parse TOML configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        self.validate_config(&config)?;

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is read first, then the home directory, then the current
    /// directory; later files override earlier ones key by key. A discovered
    /// file that fails to load is an error, since silently skipping it would
    /// run the scan with settings the operator did not ask for.
    pub fn discover_and_load(&self) -> Result<FileConfig, HostProbeError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            let config = self.load_file(&path)?;
            merged_config = self.merge_configs(merged_config, config);
            loaded_files.push(path);
        }

        if self.verbose && loaded_files.len() > 1 {
            for (i, path) in loaded_files.iter().enumerate() {
                let status = if i == loaded_files.len() - 1 {
                    "highest precedence"
                } else {
                    "overridden where keys overlap"
                };
                debug!(path = %path.display(), status, "Merged configuration file");
            }
        }

        Ok(merged_config)
    }

    /// Config file in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./hostprobe.toml", "./.hostprobe.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Config file in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".hostprobe.toml");
        path.exists().then_some(path)
    }

    /// Config file under the XDG config directory.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("hostprobe").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations with proper precedence.
    ///
    /// Values from `higher` take precedence over values from `lower`.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower), Some(higher)) => Some(DefaultsConfig {
                    threads: higher.threads.or(lower.threads),
                    format: higher.format.or(lower.format),
                    timeout: higher.timeout.or(lower.timeout),
                    connect_timeout: higher.connect_timeout.or(lower.connect_timeout),
                }),
                (lower, higher) => higher.or(lower),
            },
            resolver: match (lower.resolver, higher.resolver) {
                (Some(lower), Some(higher)) => Some(ResolverFileConfig {
                    server: higher.server.or(lower.server),
                    port: higher.port.or(lower.port),
                    protocol: higher.protocol.or(lower.protocol),
                    timeout: higher.timeout.or(lower.timeout),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), HostProbeError> {
        if let Some(defaults) = &config.defaults {
            if let Some(threads) = defaults.threads {
                if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&threads) {
                    return Err(HostProbeError::config(format!(
                        "threads must be between {} and {}",
                        MIN_CONCURRENCY, MAX_CONCURRENCY
                    )));
                }
            }

            if let Some(format) = &defaults.format {
                format.parse::<OutputFormat>()?;
            }

            if let Some(timeout) = &defaults.timeout {
                require_timeout("defaults.timeout", timeout)?;
            }

            if let Some(timeout) = &defaults.connect_timeout {
                require_timeout("defaults.connect_timeout", timeout)?;
            }
        }

        if let Some(resolver) = &config.resolver {
            if let Some(server) = &resolver.server {
                if server.trim().is_empty() {
                    return Err(HostProbeError::config("resolver.server cannot be empty"));
                }
            }

            if resolver.port == Some(0) {
                return Err(HostProbeError::config("resolver.port cannot be 0"));
            }

            if let Some(protocol) = &resolver.protocol {
                protocol.parse::<ResolverProtocol>()?;
            }

            if let Some(timeout) = &resolver.timeout {
                require_timeout("resolver.timeout", timeout)?;
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via HP_* environment
/// variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub threads: Option<usize>,
    pub resolver: Option<String>,
    pub resolver_port: Option<u16>,
    pub protocol: Option<ResolverProtocol>,
    /// Kept unparsed so an invalid value fails startup validation
    pub format: Option<String>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub dns_timeout: Option<Duration>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Apply every value present onto `config`.
    pub fn apply_to(&self, config: &mut ScanConfig) -> Result<(), HostProbeError> {
        if let Some(threads) = self.threads {
            config.concurrency = threads;
        }
        if let Some(server) = &self.resolver {
            config.resolver.server = Some(server.clone());
        }
        if let Some(port) = self.resolver_port {
            config.resolver.port = port;
        }
        if let Some(protocol) = self.protocol {
            config.resolver.protocol = protocol;
        }
        if let Some(format) = &self.format {
            config.format = format.parse()?;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = self.dns_timeout {
            config.resolver.timeout = timeout;
        }
        Ok(())
    }
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored, except `HP_FORMAT`.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Load configuration from an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();
    let get = |key: &str| lookup(key).filter(|val| !val.trim().is_empty());

    // HP_THREADS - worker count
    if let Some(val) = get("HP_THREADS") {
        match val.trim().parse::<usize>() {
            Ok(threads) if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&threads) => {
                debug!(threads, "Using HP_THREADS");
                env_config.threads = Some(threads);
            }
            _ => warn!(
                "Ignoring invalid HP_THREADS='{}', must be {}-{}",
                val, MIN_CONCURRENCY, MAX_CONCURRENCY
            ),
        }
    }

    // HP_RESOLVER - custom resolver address
    if let Some(server) = get("HP_RESOLVER") {
        debug!(%server, "Using HP_RESOLVER");
        env_config.resolver = Some(server.trim().to_string());
    }

    // HP_RESOLVER_PORT
    if let Some(val) = get("HP_RESOLVER_PORT") {
        match val.trim().parse::<u16>() {
            Ok(port) if port > 0 => {
                debug!(port, "Using HP_RESOLVER_PORT");
                env_config.resolver_port = Some(port);
            }
            _ => warn!("Ignoring invalid HP_RESOLVER_PORT='{}'", val),
        }
    }

    // HP_PROTOCOL - udp or tcp
    if let Some(val) = get("HP_PROTOCOL") {
        match val.parse::<ResolverProtocol>() {
            Ok(protocol) => {
                debug!(%protocol, "Using HP_PROTOCOL");
                env_config.protocol = Some(protocol);
            }
            Err(_) => warn!("Ignoring invalid HP_PROTOCOL='{}', use udp or tcp", val),
        }
    }

    // HP_FORMAT - validated later together with the CLI flag
    if let Some(format) = get("HP_FORMAT") {
        debug!(%format, "Using HP_FORMAT");
        env_config.format = Some(format);
    }

    env_config.timeout = env_timeout(&get, "HP_TIMEOUT");
    env_config.connect_timeout = env_timeout(&get, "HP_CONNECT_TIMEOUT");
    env_config.dns_timeout = env_timeout(&get, "HP_DNS_TIMEOUT");

    // HP_CONFIG - config file path
    if let Some(path) = get("HP_CONFIG") {
        debug!(%path, "Using HP_CONFIG");
        env_config.config = Some(path);
    }

    env_config
}

fn env_timeout<G>(get: &G, key: &str) -> Option<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let val = get(key)?;
    match parse_timeout_string(&val) {
        Some(timeout) if !timeout.is_zero() => {
            debug!(?timeout, "Using {}", key);
            Some(timeout)
        }
        _ => {
            warn!(
                "Ignoring invalid {}='{}', use format like '500ms', '5s', '2m'",
                key, val
            );
            None
        }
    }
}

fn require_timeout(field: &str, value: &str) -> Result<Duration, HostProbeError> {
    match parse_timeout_string(value) {
        Some(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(HostProbeError::config(format!(
            "Invalid {} '{}'. Use format like '500ms', '5s', '2m'",
            field, value
        ))),
    }
}

/// Parse a timeout string like "500ms", "5s", "2m" or a bare number of
/// seconds.
///
/// Returns `None` if the string is not a valid duration.
pub fn parse_timeout_string(timeout_str: &str) -> Option<Duration> {
    let timeout_str = timeout_str.trim().to_lowercase();

    if let Some(ms) = timeout_str.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = timeout_str.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = timeout_str.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        // Assume seconds if no unit
        timeout_str.parse::<u64>().ok().map(Duration::from_secs)
    }
}
