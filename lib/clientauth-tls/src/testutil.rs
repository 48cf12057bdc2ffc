//! Certificate fixtures for unit tests

use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::keystore::PrivateKeyEntry;

/// A self-signed certificate with its PKCS#8 key
pub(crate) struct Identity {
    pub cert: CertificateDer<'static>,
    pub key_pkcs8: Vec<u8>,
    pub cert_pem: String,
    pub key_pem: String,
}

impl Identity {
    pub fn key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_pkcs8.clone()))
    }

    pub fn entry(&self, alias: &str) -> PrivateKeyEntry {
        PrivateKeyEntry::new(alias, self.key(), vec![self.cert.clone()])
    }
}

pub(crate) fn identity(name: &str) -> Identity {
    let key = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec![name.to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    Identity {
        cert: CertificateDer::from(cert.der().to_vec()),
        key_pkcs8: key.serialize_der(),
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}
