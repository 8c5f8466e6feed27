//! TLS certificate probe.
//!
//! Connects to the target over HTTPS, accepts whatever certificate the
//! server presents, and turns the leaf certificate's subject alternative
//! DNS names and subject common name into records.

use crate::error::HostProbeError;
use crate::probes::Probe;
use crate::types::{Record, RecordKind, ScanConfig};
use crate::utils::to_https_url;
use async_trait::async_trait;
use reqwest::tls::TlsInfo;
use std::time::Duration;
use tracing::debug;
use x509_parser::prelude::*;

/// HTTPS probe sharing one connection pool across all workers.
#[derive(Clone)]
pub struct TlsProbe {
    /// Shared client; cloning it only bumps a reference count
    http_client: reqwest::Client,
}

impl TlsProbe {
    /// Create a TLS probe with the default timeouts.
    pub fn new() -> Result<Self, HostProbeError> {
        let config = ScanConfig::default();
        Self::with_timeouts(config.connect_timeout, config.request_timeout)
    }

    /// Create a TLS probe with custom timeouts.
    ///
    /// `connect_timeout` bounds the TCP connect and TLS handshake,
    /// `request_timeout` bounds the whole request.
    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, HostProbeError> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .tls_info(true)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                HostProbeError::config(format!("Failed to create HTTPS client: {}", e))
            })?;

        Ok(Self { http_client })
    }

    /// Fetch the DER-encoded leaf certificate presented by `target`.
    ///
    /// Returns `Ok(None)` when the connection succeeded but no peer
    /// certificate was recorded.
    async fn fetch_peer_certificate(&self, target: &str) -> Result<Option<Vec<u8>>, HostProbeError> {
        let url = to_https_url(target);
        debug!(target, %url, "Sending HEAD request for certificate");

        let response = self
            .http_client
            .head(&url)
            .send()
            .await
            .map_err(|e| describe_request_error(target, e))?;

        let der = response
            .extensions()
            .get::<TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .map(|der| der.to_vec());

        Ok(der)
    }
}

#[async_trait]
impl Probe for TlsProbe {
    fn name(&self) -> &'static str {
        "tls"
    }

    async fn probe(&self, target: &str) -> Result<Vec<Record>, HostProbeError> {
        match self.fetch_peer_certificate(target).await? {
            Some(der) => records_from_certificate(target, &der),
            None => {
                debug!(target, "Connection carried no peer certificate");
                Ok(Vec::new())
            }
        }
    }
}

fn describe_request_error(target: &str, err: reqwest::Error) -> HostProbeError {
    if err.is_timeout() {
        HostProbeError::tls(target, "request timed out")
    } else if err.is_connect() {
        HostProbeError::tls(target, format!("connection failed: {}", err))
    } else if err.is_builder() {
        HostProbeError::invalid_target(target, format!("not a usable URL: {}", err))
    } else {
        HostProbeError::tls(target, err.to_string())
    }
}

/// Extract records from a DER-encoded leaf certificate.
///
/// Emits one `SSL-SAN` record per DNS subject alternative name, in
/// certificate order, followed by exactly one `SSL-CN` record. The common
/// name record is emitted even when the subject has no CN (empty name).
pub fn records_from_certificate(target: &str, der: &[u8]) -> Result<Vec<Record>, HostProbeError> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| HostProbeError::certificate(format!("X.509 parse error: {}", e)))?;

    let mut records = Vec::new();

    match cert.subject_alternative_name() {
        Ok(Some(san)) => {
            for general_name in &san.value.general_names {
                if let GeneralName::DNSName(dns_name) = general_name {
                    records.push(Record::new(RecordKind::SslSan, target, *dns_name));
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            // A broken SAN extension still leaves the subject usable.
            debug!(target, error = %e, "Ignoring malformed subjectAltName extension");
        }
    }

    // Later CN attributes override earlier ones, matching common TLS stacks.
    let common_name = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .last()
        .unwrap_or("");
    records.push(Record::new(RecordKind::SslCn, target, common_name));

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_rustls::rustls;
    use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio_rustls::TlsAcceptor;

    /// Self-signed certificate and its PKCS#8 private key, both DER.
    fn self_signed_with_key(sans: &[&str], common_name: Option<&str>) -> (Vec<u8>, Vec<u8>) {
        let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name = DistinguishedName::new();
        if let Some(cn) = common_name {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.der().to_vec(), key_pair.serialize_der())
    }

    fn self_signed(sans: &[&str], common_name: Option<&str>) -> Vec<u8> {
        self_signed_with_key(sans, common_name).0
    }

    /// HTTPS server on loopback that answers every request with an empty 200.
    async fn spawn_https_server(cert_der: Vec<u8>, key_der: Vec<u8>) -> SocketAddr {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(
                vec![CertificateDer::from(cert_der)],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
            )
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    let mut buf = [0u8; 1024];
                    let _ = tls.read(&mut buf).await;
                    let _ = tls
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        )
                        .await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        addr
    }

    #[test]
    fn test_sans_and_common_name() {
        let der = self_signed(&["a.example.com", "b.example.com"], Some("example.com"));
        let records = records_from_certificate("10.0.0.1", &der).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            Record::new(RecordKind::SslSan, "10.0.0.1", "a.example.com")
        );
        assert_eq!(
            records[1],
            Record::new(RecordKind::SslSan, "10.0.0.1", "b.example.com")
        );
        assert_eq!(
            records[2],
            Record::new(RecordKind::SslCn, "10.0.0.1", "example.com")
        );
    }

    #[test]
    fn test_common_name_always_emitted() {
        let der = self_signed(&["only.example.com"], None);
        let records = records_from_certificate("host", &der).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind(), RecordKind::SslCn);
        assert_eq!(records[1].name(), "");
    }

    #[test]
    fn test_no_sans_yields_only_common_name() {
        let der = self_signed(&[], Some("lonely.example.com"));
        let records = records_from_certificate("host", &der).unwrap();

        assert_eq!(
            records,
            vec![Record::new(RecordKind::SslCn, "host", "lonely.example.com")]
        );
    }

    #[test]
    fn test_garbage_der_is_an_error() {
        let result = records_from_certificate("host", b"definitely not a certificate");
        assert!(matches!(result, Err(HostProbeError::Certificate { .. })));
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        // Grab a free port, then close it so the connect is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe =
            TlsProbe::with_timeouts(Duration::from_secs(2), Duration::from_secs(3)).unwrap();
        let result = probe.probe(&format!("127.0.0.1:{}", port)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_self_signed_server_yields_names() {
        let (cert_der, key_der) =
            self_signed_with_key(&["a.example.com", "b.example.com"], Some("example.com"));
        let addr = spawn_https_server(cert_der, key_der).await;

        let client =
            TlsProbe::with_timeouts(Duration::from_secs(5), Duration::from_secs(10)).unwrap();

        for target in [addr.to_string(), format!("http://{}", addr)] {
            let records = client.probe(&target).await.unwrap();
            assert_eq!(
                records,
                vec![
                    Record::new(RecordKind::SslSan, target.as_str(), "a.example.com"),
                    Record::new(RecordKind::SslSan, target.as_str(), "b.example.com"),
                    Record::new(RecordKind::SslCn, target.as_str(), "example.com"),
                ],
                "target {}",
                target
            );
        }
    }
}
