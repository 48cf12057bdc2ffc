//! Protocol selection from an algorithm identifier

use clientauth_core::{ClientAuthError, Result};
use rustls::SupportedProtocolVersion;
use std::fmt;
use std::str::FromStr;

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Protocol family requested for the client context
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsAlgorithm {
    /// Any supported TLS version (1.2 or 1.3)
    Tls,
    /// TLS 1.2 only
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

impl TlsAlgorithm {
    /// Parse an algorithm identifier such as "TLS", "TLSv1.2" or "1.3"
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tls" => Ok(TlsAlgorithm::Tls),
            "tlsv1.2" | "1.2" => Ok(TlsAlgorithm::Tls12),
            "tlsv1.3" | "1.3" => Ok(TlsAlgorithm::Tls13),
            _ => Err(ClientAuthError::UnsupportedAlgorithm(format!(
                "{}. Must be TLS, TLSv1.2 or TLSv1.3",
                name
            ))),
        }
    }

    /// Protocol versions enabled for this algorithm
    pub fn protocol_versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            TlsAlgorithm::Tls => rustls::ALL_VERSIONS,
            TlsAlgorithm::Tls12 => TLS12_ONLY,
            TlsAlgorithm::Tls13 => TLS13_ONLY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsAlgorithm::Tls => "TLS",
            TlsAlgorithm::Tls12 => "TLSv1.2",
            TlsAlgorithm::Tls13 => "TLSv1.3",
        }
    }
}

impl Default for TlsAlgorithm {
    fn default() -> Self {
        TlsAlgorithm::Tls
    }
}

impl FromStr for TlsAlgorithm {
    type Err = ClientAuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TlsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
