//! Utility functions for target handling.
//!
//! Small string helpers shared by the probes. Targets are otherwise passed
//! through untouched; only the probes decide what they can work with.

use crate::error::HostProbeError;
use std::net::IpAddr;

/// Build the HTTPS URL the TLS probe connects to.
///
/// - `https://...` is used as-is
/// - `http://...` has its scheme rewritten to `https://`
/// - anything else gets `https://` prepended
pub fn to_https_url(target: &str) -> String {
    if let Some(rest) = target.strip_prefix("http://") {
        format!("https://{}", rest)
    } else if target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}

/// Strip a single trailing dot from a fully qualified name.
pub fn strip_trailing_dot(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Parse a target as an IP address for reverse lookups.
///
/// Bracketed IPv6 literals (`[::1]`) are accepted as well.
pub fn parse_ip_target(target: &str) -> Result<IpAddr, HostProbeError> {
    let candidate = target
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(target);

    candidate.parse::<IpAddr>().map_err(|_| {
        HostProbeError::invalid_target(target, "reverse lookup needs an IP address")
    })
}
