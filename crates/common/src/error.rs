use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors raised while reading names and durations out of a bundle document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported protocol: '{0}'")]
    Protocol(String),
    #[error("unsupported trigger event: '{0}'")]
    Event(String),
    #[error("invalid duration: '{0}'")]
    Duration(String),
}

/// Why a single probe attempt failed.
///
/// The `Display` text of the variant is what a check's result reports, so the
/// variants carry owned, printable detail rather than the source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("error dialling {address} on protocol {protocol}: {reason}")]
    Dial {
        address: String,
        protocol: String,
        reason: String,
    },
    #[error("error resolving {address}: {reason}")]
    Resolve { address: String, reason: String },
    #[error("hostname mismatch in certificate from host {address}: {reason}")]
    HostnameMismatch { address: String, reason: String },
    #[error(
        "certificate from host {address} expired on {} (issuer: {issuer})",
        .expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
    )]
    CertificateExpired {
        address: String,
        expiry: DateTime<Utc>,
        issuer: String,
    },
    #[error("error running ping against {address}: {reason}")]
    Echo { address: String, reason: String },
    #[error("error opening SSH session to {address}: {reason}")]
    Handshake { address: String, reason: String },
    #[error("check cancelled before completion")]
    Cancelled,
    #[error("check aborted: {0}")]
    Aborted(String),
}

impl ProbeError {
    /// A stable, machine-readable tag for the failure cause.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Dial { .. } => "dial",
            ProbeError::Resolve { .. } => "resolve",
            ProbeError::HostnameMismatch { .. } => "hostname-mismatch",
            ProbeError::CertificateExpired { .. } => "certificate-expired",
            ProbeError::Echo { .. } => "echo",
            ProbeError::Handshake { .. } => "handshake",
            ProbeError::Cancelled => "cancelled",
            ProbeError::Aborted(_) => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expired_certificate_reports_expiry_and_issuer() {
        let error = ProbeError::CertificateExpired {
            address: "example.com:443".to_string(),
            expiry: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
            issuer: "CN=Test CA".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "certificate from host example.com:443 expired on 2020-01-02T03:04:05Z (issuer: CN=Test CA)"
        );
        assert_eq!(error.kind(), "certificate-expired");
    }

    #[test]
    fn dial_and_mismatch_are_distinct_causes() {
        let dial = ProbeError::Dial {
            address: "127.0.0.1:1".to_string(),
            protocol: "tls".to_string(),
            reason: "connection refused".to_string(),
        };
        let mismatch = ProbeError::HostnameMismatch {
            address: "localhost:443".to_string(),
            reason: "certificate is valid for other.test, not localhost".to_string(),
        };
        assert_ne!(dial.kind(), mismatch.kind());
        assert!(dial.to_string().starts_with("error dialling 127.0.0.1:1 on protocol tls"));
    }
}
