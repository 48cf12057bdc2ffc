//! Server trust policies for the client context

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tracing::debug;

/// How the server's certificate is judged during the handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Verify chain and hostname against the keystore's trust entries
    VerifyWithKeystore,
    /// Accept any server certificate and any hostname
    AcceptAny,
}

impl TrustPolicy {
    pub fn from_verify_flag(verify_server_cert: bool) -> Self {
        if verify_server_cert {
            TrustPolicy::VerifyWithKeystore
        } else {
            TrustPolicy::AcceptAny
        }
    }

    pub fn verifies_server(&self) -> bool {
        matches!(self, TrustPolicy::VerifyWithKeystore)
    }
}

/// Build a root store from trust anchors, skipping certificates that cannot anchor a chain
pub fn build_root_store(anchors: &[CertificateDer<'static>]) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(anchors.iter().cloned());
    debug!("Root store built with {} anchor(s), {} ignored", added, ignored);
    roots
}

/// Server verifier that trusts every certificate chain and hostname.
///
/// Handshake signatures are still checked, so the server must hold the key
/// for the certificate it presents. Only clients built from the owning
/// context are affected.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
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
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
