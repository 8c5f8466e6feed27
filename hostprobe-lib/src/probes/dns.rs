//! Reverse DNS probe.
//!
//! Looks up PTR records for IP targets, either through the system resolver
//! or through a single custom name server.

use crate::error::HostProbeError;
use crate::probes::Probe;
use crate::types::{Record, RecordKind, ResolverProtocol, ResolverSettings};
use crate::utils::{parse_ip_target, strip_trailing_dot};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// PTR lookup probe backed by one shared async resolver.
#[derive(Clone)]
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    /// Per-query timeout, kept for error reporting
    timeout: Duration,
}

impl DnsProbe {
    /// Build the resolver once from the given settings.
    ///
    /// A custom server given as a hostname is resolved here, at startup,
    /// so a typo fails before any target is read.
    pub fn new(settings: &ResolverSettings) -> Result<Self, HostProbeError> {
        let (config, opts) = build_resolver_config(settings)?;
        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout: settings.timeout,
        })
    }
}

#[async_trait]
impl Probe for DnsProbe {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn probe(&self, target: &str) -> Result<Vec<Record>, HostProbeError> {
        let ip = parse_ip_target(target)?;

        let lookup = self.resolver.reverse_lookup(ip).await.map_err(|e| {
            match e.kind() {
                ResolveErrorKind::Timeout => HostProbeError::timeout(
                    format!("PTR lookup for {}", target),
                    self.timeout,
                ),
                _ => HostProbeError::dns(target, e.to_string()),
            }
        })?;

        let names = lookup.iter().map(|name| name.to_string());
        Ok(records_from_ptr_names(target, names))
    }
}

/// Turn PTR answers into records, one per name, trailing dot stripped.
pub fn records_from_ptr_names<I>(target: &str, names: I) -> Vec<Record>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|name| Record::new(RecordKind::DnsPtr, target, strip_trailing_dot(&name)))
        .collect()
}

/// Resolver configuration for the given settings.
fn build_resolver_config(
    settings: &ResolverSettings,
) -> Result<(ResolverConfig, ResolverOpts), HostProbeError> {
    let (config, mut opts) = match &settings.server {
        Some(server) => {
            let socket_addr = resolve_server_address(server, settings.port)?;
            let protocol = match settings.protocol {
                ResolverProtocol::Udp => Protocol::Udp,
                ResolverProtocol::Tcp => Protocol::Tcp,
            };
            debug!(%socket_addr, ?protocol, "Using custom resolver");

            let mut config = ResolverConfig::new();
            config.add_name_server(NameServerConfig::new(socket_addr, protocol));
            (config, ResolverOpts::default())
        }
        None => match read_system_conf() {
            Ok((config, opts)) => (config, opts),
            Err(e) => {
                warn!(error = %e, "Could not read system resolver configuration, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        },
    };

    opts.timeout = settings.timeout;
    Ok((config, opts))
}

fn resolve_server_address(server: &str, port: u16) -> Result<SocketAddr, HostProbeError> {
    let server = server.trim();

    if let Ok(ip) = parse_ip_target(server) {
        return Ok(SocketAddr::new(ip, port));
    }

    (server, port)
        .to_socket_addrs()
        .map_err(|e| {
            HostProbeError::config(format!("Cannot resolve resolver address '{}': {}", server, e))
        })?
        .next()
        .ok_or_else(|| {
            HostProbeError::config(format!("Resolver address '{}' has no addresses", server))
        })
}
