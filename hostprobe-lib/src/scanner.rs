//! Main scanner implementation.
//!
//! This module provides the `HostScanner` struct that builds the shared
//! probe clients once and drives them through the concurrent pipeline.

use crate::error::HostProbeError;
use crate::pipeline::{Pipeline, PipelineSummary, SharedProbe};
use crate::probes::{DnsProbe, TlsProbe};
use crate::types::{Record, ScanConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncBufRead;

/// Scanner that runs the TLS probe and then the DNS probe on every target.
///
/// # Example
///
/// ```rust,no_run
/// use hostprobe_lib::{HostScanner, ScanConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scanner = HostScanner::with_config(ScanConfig::default().with_concurrency(8))?;
///     let input: &[u8] = b"1.1.1.1\n8.8.8.8\n";
///     scanner
///         .scan(input, |record| {
///             println!("{} {} {}", record.kind(), record.target(), record.name());
///             Ok(())
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct HostScanner {
    /// Configuration settings for this scanner instance
    config: ScanConfig,
    pipeline: Pipeline,
}

impl HostScanner {
    /// Create a scanner with custom configuration.
    ///
    /// The configuration is validated and the HTTPS client and DNS resolver
    /// are built here, before any input is read.
    pub fn with_config(config: ScanConfig) -> Result<Self, HostProbeError> {
        config.validate()?;

        let tls = TlsProbe::with_timeouts(config.connect_timeout, config.request_timeout)?;
        let dns = DnsProbe::new(&config.resolver)?;

        let probes: Vec<SharedProbe> = vec![Arc::new(tls), Arc::new(dns)];
        let pipeline = Pipeline::new(probes, config.concurrency);

        Ok(Self { config, pipeline })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan every target in `input` until it is exhausted.
    pub async fn scan<R, F>(&self, input: R, on_record: F) -> Result<PipelineSummary, HostProbeError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        F: FnMut(Record) -> Result<(), HostProbeError>,
    {
        self.pipeline.run(input, on_record).await
    }

    /// Scan until `input` is exhausted or `shutdown` resolves.
    ///
    /// Targets already read when `shutdown` fires are still probed.
    pub async fn scan_until<R, S, F>(
        &self,
        input: R,
        shutdown: S,
        on_record: F,
    ) -> Result<PipelineSummary, HostProbeError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        S: Future<Output = ()> + Send + 'static,
        F: FnMut(Record) -> Result<(), HostProbeError>,
    {
        self.pipeline.run_until(input, shutdown, on_record).await
    }
}
