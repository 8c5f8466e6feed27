//! Error handling for probe and pipeline operations.
//!
//! Two families live in one enum: configuration errors, which are fatal and
//! reported before any input is read, and per-target probe errors, which the
//! worker pool swallows at the probe boundary.

use std::fmt;
use std::time::Duration;

/// Main error type for hostprobe operations.
#[derive(Debug, Clone)]
pub enum HostProbeError {
    /// Target cannot be used by a probe (e.g. reverse lookup of a hostname)
    InvalidTarget {
        target: String,
        reason: String,
    },

    /// Connection, handshake or request failure during the TLS probe
    Tls {
        target: String,
        message: String,
    },

    /// Peer certificate could not be parsed
    Certificate {
        message: String,
    },

    /// Resolver failure during the DNS probe
    Dns {
        target: String,
        message: String,
    },

    /// Timeout errors when operations take too long
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading configuration files
    FileError {
        path: String,
        message: String,
    },

    /// Output format name that is neither `text` nor `json`
    InvalidFormat {
        format: String,
    },

    /// Failure writing or encoding a record
    Output {
        message: String,
    },
}

impl HostProbeError {
    /// Create a new invalid target error.
    pub fn invalid_target<T: Into<String>, R: Into<String>>(target: T, reason: R) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a new TLS probe error.
    pub fn tls<T: Into<String>, M: Into<String>>(target: T, message: M) -> Self {
        Self::Tls {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a new certificate parsing error.
    pub fn certificate<M: Into<String>>(message: M) -> Self {
        Self::Certificate {
            message: message.into(),
        }
    }

    /// Create a new DNS probe error.
    pub fn dns<T: Into<String>, M: Into<String>>(target: T, message: M) -> Self {
        Self::Dns {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new output error.
    pub fn output<M: Into<String>>(message: M) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Whether this error must stop the process before any work begins.
    ///
    /// Everything else is a per-target failure that the pool recovers from.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. } | Self::FileError { .. } | Self::InvalidFormat { .. }
        )
    }
}

impl fmt::Display for HostProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget { target, reason } => {
                write!(f, "Invalid target '{}': {}", target, reason)
            }
            Self::Tls { target, message } => {
                write!(f, "TLS probe failed for '{}': {}", target, message)
            }
            Self::Certificate { message } => {
                write!(f, "Certificate error: {}", message)
            }
            Self::Dns { target, message } => {
                write!(f, "DNS probe failed for '{}': {}", target, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::InvalidFormat { format } => {
                write!(
                    f,
                    "invalid output format '{}' (supported: text, json)",
                    format
                )
            }
            Self::Output { message } => {
                write!(f, "Output error: {}", message)
            }
        }
    }
}

impl std::error::Error for HostProbeError {}

impl From<serde_json::Error> for HostProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::output(format!("JSON encoding failed: {}", err))
    }
}

impl From<std::io::Error> for HostProbeError {
    fn from(err: std::io::Error) -> Self {
        Self::Output {
            message: format!("I/O error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(HostProbeError::config("bad threads").is_config_error());
        assert!(HostProbeError::InvalidFormat {
            format: "xml".to_string()
        }
        .is_config_error());
        assert!(HostProbeError::file_error("/nope.toml", "missing").is_config_error());
    }

    #[test]
    fn test_probe_errors_are_recoverable() {
        assert!(!HostProbeError::tls("10.0.0.1", "handshake").is_config_error());
        assert!(!HostProbeError::dns("10.0.0.1", "NXDOMAIN").is_config_error());
        assert!(!HostProbeError::invalid_target("example.com", "not an IP").is_config_error());
        assert!(!HostProbeError::timeout("lookup", Duration::from_secs(5)).is_config_error());
    }

    #[test]
    fn test_invalid_format_message() {
        let err = HostProbeError::InvalidFormat {
            format: "yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid output format 'yaml' (supported: text, json)"
        );
    }
}
