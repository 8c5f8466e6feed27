//! Core data types for the probe pipeline.
//!
//! This module defines the record emitted for every discovered name and the
//! configuration used to build probes and size the worker pool.

use crate::error::HostProbeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which probe produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// DNS name from the certificate's subject alternative names
    #[serde(rename = "SSL-SAN")]
    SslSan,

    /// Subject common name of the certificate
    #[serde(rename = "SSL-CN")]
    SslCn,

    /// Name returned by a reverse (PTR) lookup
    #[serde(rename = "DNS-PTR")]
    DnsPtr,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::SslSan => "SSL-SAN",
            RecordKind::SslCn => "SSL-CN",
            RecordKind::DnsPtr => "DNS-PTR",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered name.
///
/// Records are immutable once built. The JSON form keeps the field names of
/// the established output format: `Type`, `Name` and `IP` (the verbatim
/// target, whether it was an address or a hostname).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Record {
    #[serde(rename = "Type")]
    kind: RecordKind,

    #[serde(rename = "Name")]
    name: String,

    #[serde(rename = "IP")]
    target: String,
}

impl Record {
    pub fn new<T: Into<String>, N: Into<String>>(kind: RecordKind, target: T, name: N) -> Self {
        Self {
            kind,
            target: target.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// The input line that produced this record, unmodified.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Output encoding selected at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[Type] Target Name`
    #[default]
    Text,

    /// One JSON object per line
    Json,
}

impl FromStr for OutputFormat {
    type Err = HostProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(HostProbeError::InvalidFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Transport used to reach a custom resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolverProtocol {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for ResolverProtocol {
    type Err = HostProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "udp" => Ok(ResolverProtocol::Udp),
            "tcp" => Ok(ResolverProtocol::Tcp),
            _ => Err(HostProbeError::config(format!(
                "Unknown resolver protocol '{}', use tcp or udp",
                s
            ))),
        }
    }
}

impl fmt::Display for ResolverProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverProtocol::Udp => write!(f, "udp"),
            ResolverProtocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// How the DNS probe reaches a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Custom resolver address or hostname. `None` uses the system resolver.
    pub server: Option<String>,

    /// Port of the custom resolver
    /// Default: 53
    pub port: u16,

    /// Transport for the custom resolver
    /// Default: udp
    pub protocol: ResolverProtocol,

    /// Per-query timeout
    /// Default: 5 seconds
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            server: None,
            port: 53,
            protocol: ResolverProtocol::Udp,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Lowest and highest accepted worker counts.
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 10_000;

/// Configuration for a scan.
///
/// Built once at startup and never mutated while workers run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Number of workers in the pool
    /// Default: 32
    pub concurrency: usize,

    /// Resolver used by the DNS probe
    pub resolver: ResolverSettings,

    /// Output encoding
    /// Default: text
    pub format: OutputFormat,

    /// TCP connect plus TLS handshake budget for the TLS probe
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Whole-request budget for the TLS probe
    /// Default: 10 seconds
    pub request_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            resolver: ResolverSettings::default(),
            format: OutputFormat::Text,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ScanConfig {
    /// Set the worker count. Out-of-range values are rejected by [`ScanConfig::validate`].
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverSettings) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the settings that would otherwise fail later in the run.
    pub fn validate(&self) -> Result<(), HostProbeError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(HostProbeError::config(format!(
                "Thread count must be between {} and {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY
            )));
        }

        if self.resolver.port == 0 {
            return Err(HostProbeError::config("Resolver port cannot be 0"));
        }

        if let Some(server) = &self.resolver.server {
            if server.trim().is_empty() {
                return Err(HostProbeError::config("Resolver address cannot be empty"));
            }
        }

        for (label, value) in [
            ("connect timeout", self.connect_timeout),
            ("request timeout", self.request_timeout),
            ("DNS timeout", self.resolver.timeout),
        ] {
            if value.is_zero() {
                return Err(HostProbeError::config(format!("{} must be positive", label)));
            }
        }

        Ok(())
    }
}
