//! # Host Probe Library
//!
//! Concurrent hostname discovery for a stream of targets. Every target is
//! probed twice: the TLS probe reads the names in the certificate the target
//! presents, and the DNS probe asks for its reverse (PTR) names.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostprobe_lib::{render_record, HostScanner, OutputFormat, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scanner = HostScanner::with_config(ScanConfig::default())?;
//!     let input = tokio::io::BufReader::new(tokio::io::stdin());
//!
//!     scanner
//!         .scan(input, |record| {
//!             println!("{}", render_record(&record, OutputFormat::Text)?);
//!             Ok(())
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **TLS probe**: subject alternative names and common name of the leaf certificate
//! - **DNS probe**: PTR lookups through the system or a custom resolver
//! - **Worker pool**: fixed-size, every target handled exactly once
//! - **Configurable**: TOML files, `HP_*` environment variables

// Re-export main public API types and functions
pub use config::{
    load_env_config, load_env_config_from, parse_timeout_string, ConfigManager, EnvConfig,
    FileConfig,
};
pub use error::HostProbeError;
pub use format::render_record;
pub use pipeline::{
    dispatch, CompletionTracker, Pipeline, PipelineSummary, PoolReport, SharedProbe, WorkerPool,
    WorkerStats,
};
pub use probes::{DnsProbe, Probe, TlsProbe};
pub use scanner::HostScanner;
pub use types::{
    OutputFormat, Record, RecordKind, ResolverProtocol, ResolverSettings, ScanConfig,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};

// Public modules
pub mod pipeline;
pub mod probes;

// Internal modules
mod config;
mod error;
mod format;
mod scanner;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, HostProbeError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
