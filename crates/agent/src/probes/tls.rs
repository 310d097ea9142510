//! TLS probing over TCP, and over a connected UDP socket for `dtls`.
//!
//! The chain is never validated against a trust store. What is checked, in
//! order, is that the handshake completes, that the leaf certificate names
//! the host that was dialled, and that the leaf has not expired.
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, error};
use x509_parser::prelude::*;

use netcheck_common::{split_host_port, ProbeError, Protocol};

use super::datagram::DatagramStream;
use super::dial;

/// The carrier the TLS records travel over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stream,
    /// Plain TLS records sent over a connected UDP socket.
    ///
    /// This is not DTLS: there is no DTLS record layer, epoch handling or
    /// retransmission, so a real DTLS server will not complete the
    /// handshake. It only confirms that a peer answers TLS over UDP.
    Datagram,
}

impl Transport {
    fn protocol(&self) -> Protocol {
        match self {
            Transport::Stream => Protocol::Tls,
            Transport::Datagram => Protocol::Dtls,
        }
    }
}

/// Accepts any certificate chain while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn client_config() -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(config)
}

/// What the probe needs from the peer's leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafCertificate {
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    common_names: Vec<String>,
    pub(crate) not_after: DateTime<Utc>,
    pub(crate) issuer: String,
}

impl LeafCertificate {
    pub(crate) fn from_der(der: &[u8]) -> Result<Self, String> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| format!("unparsable certificate: {e}"))?;

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }
        let common_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok().map(str::to_string))
            .collect();

        let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Ok(Self {
            dns_names,
            ip_addresses,
            common_names,
            not_after,
            issuer: cert.issuer().to_string(),
        })
    }

    /// Whether the certificate is valid for `host`, a DNS name or IP literal.
    ///
    /// The subject common name is only consulted when the certificate has no
    /// subject alternative names at all.
    pub(crate) fn matches(&self, host: &str) -> bool {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.ip_addresses.contains(&ip)
                || (self.dns_names.is_empty()
                    && self.ip_addresses.is_empty()
                    && self.common_names.iter().any(|cn| cn == host));
        }
        if self.dns_names.is_empty() && self.ip_addresses.is_empty() {
            return self.common_names.iter().any(|cn| name_matches(cn, host));
        }
        self.dns_names.iter().any(|pattern| name_matches(pattern, host))
    }

    fn names(&self) -> String {
        let mut names: Vec<String> = self.dns_names.clone();
        names.extend(self.ip_addresses.iter().map(IpAddr::to_string));
        if names.is_empty() {
            names.extend(self.common_names.iter().cloned());
        }
        names.join(", ")
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Case-insensitive DNS name comparison; `*.` may stand for exactly one
/// leftmost label.
fn name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == host,
    }
}

async fn handshake<IO>(
    stream: IO,
    host: &str,
    address: &str,
    protocol: Protocol,
) -> Result<LeafCertificate, ProbeError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let dial_error = |reason: String| ProbeError::Dial {
        address: address.to_string(),
        protocol: protocol.to_string(),
        reason,
    };

    let config = client_config().map_err(|e| dial_error(e.to_string()))?;
    let server_name =
        ServerName::try_from(host.to_string()).map_err(|e| dial_error(e.to_string()))?;
    let connector = TlsConnector::from(Arc::new(config));
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| dial_error(format!("handshake failed: {e}")))?;

    let (_, session) = tls_stream.get_ref();
    debug!(address, version = ?session.protocol_version(), "TLS handshake completed.");
    let leaf = session
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| dial_error("peer presented no certificate".to_string()))?;
    LeafCertificate::from_der(leaf.as_ref()).map_err(dial_error)
}

async fn establish(
    address: &str,
    host: &str,
    timeout: Duration,
    transport: Transport,
) -> Result<LeafCertificate, ProbeError> {
    let protocol = transport.protocol();
    let session = async {
        match transport {
            Transport::Stream => {
                let stream = dial::connect_stream(address, protocol, timeout).await?;
                handshake(stream, host, address, protocol).await
            }
            Transport::Datagram => {
                let socket = dial::connect_datagram(address, protocol, timeout).await?;
                handshake(DatagramStream::new(socket), host, address, protocol).await
            }
        }
    };
    match tokio::time::timeout(timeout, session).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Dial {
            address: address.to_string(),
            protocol: protocol.to_string(),
            reason: format!("handshake timed out after {timeout:?}"),
        }),
    }
}

pub async fn probe(address: &str, timeout: Duration, transport: Transport) -> Result<(), ProbeError> {
    let (host, _) = split_host_port(address);
    let leaf = establish(address, host, timeout, transport).await?;

    if !leaf.matches(host) {
        error!(hostname = host, names = %leaf.names(), "Hostname does not match certificate.");
        return Err(ProbeError::HostnameMismatch {
            address: address.to_string(),
            reason: format!("certificate is valid for {}, not {host}", leaf.names()),
        });
    }

    if leaf.not_after < Utc::now() {
        error!(expiry = %leaf.not_after.to_rfc3339(), "Certificate has expired.");
        return Err(ProbeError::CertificateExpired {
            address: address.to_string(),
            expiry: leaf.not_after,
            issuer: leaf.issuer,
        });
    }
    debug!(address, issuer = %leaf.issuer, expiry = %leaf.not_after.to_rfc3339(), "Certificate accepted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(dns: &[&str], ips: &[&str], cns: &[&str]) -> LeafCertificate {
        LeafCertificate {
            dns_names: dns.iter().map(|s| s.to_string()).collect(),
            ip_addresses: ips.iter().map(|s| s.parse().unwrap()).collect(),
            common_names: cns.iter().map(|s| s.to_string()).collect(),
            not_after: Utc::now(),
            issuer: "CN=test".to_string(),
        }
    }

    #[test]
    fn wildcard_covers_exactly_one_label() {
        assert!(name_matches("*.example.com", "www.example.com"));
        assert!(name_matches("*.Example.COM", "api.example.com."));
        assert!(!name_matches("*.example.com", "example.com"));
        assert!(!name_matches("*.example.com", "a.b.example.com"));
        assert!(name_matches("example.com", "EXAMPLE.com"));
    }

    #[test]
    fn subject_names_win_over_common_name() {
        let cert = leaf(&["other.test"], &[], &["localhost"]);
        assert!(!cert.matches("localhost"));
        assert!(cert.matches("other.test"));

        let legacy = leaf(&[], &[], &["localhost"]);
        assert!(legacy.matches("localhost"));
    }

    #[test]
    fn ip_literals_match_ip_entries_only() {
        let cert = leaf(&["127.0.0.1"], &["::1"], &[]);
        assert!(cert.matches("::1"));
        assert!(!cert.matches("127.0.0.1"));
        assert_eq!(cert.names(), "127.0.0.1, ::1");
    }

    #[test]
    fn parses_a_generated_certificate() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params =
            rcgen::CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let parsed = LeafCertificate::from_der(cert.der()).unwrap();
        assert!(parsed.matches("localhost"));
        assert!(parsed.matches("127.0.0.1"));
        assert!(!parsed.matches("example.com"));
        assert!(parsed.not_after > Utc::now());
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert!(LeafCertificate::from_der(b"not a certificate").is_err());
    }
}
