//! Probe implementations.
//!
//! A probe takes one target and returns the names it discovered. Probes are
//! independent: a failure in one never affects the other, and the worker pool
//! turns every `Err` into "no records" for that probe on that target.

use crate::error::HostProbeError;
use crate::types::Record;
use async_trait::async_trait;

/// TLS certificate name extraction
pub mod tls;

/// Reverse DNS (PTR) lookups
pub mod dns;

pub use dns::{records_from_ptr_names, DnsProbe};
pub use tls::{records_from_certificate, TlsProbe};

/// A single check run against every target.
///
/// Implementations hold only shared, read-only handles (HTTP client,
/// resolver) so one instance can serve every worker concurrently.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Probe one target.
    ///
    /// `Ok(vec![])` is a valid outcome. Errors are reported to the caller
    /// but are never fatal to the pipeline.
    async fn probe(&self, target: &str) -> Result<Vec<Record>, HostProbeError>;
}
