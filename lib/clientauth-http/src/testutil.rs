//! On-disk key material for unit tests

use clientauth_core::ClientAuthConfig;
use clientauth_tls::{Keystore, KeystoreFormat, PrivateKeyEntry};
use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::path::PathBuf;

/// A passphrase file and a JKS keystore holding one self-signed client key
pub(crate) struct KeyMaterialFixture {
    _dir: tempfile::TempDir,
    pub passphrase: PathBuf,
    pub keystore: PathBuf,
}

impl KeyMaterialFixture {
    pub fn jks(password: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["client.test".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let mut store = Keystore::new(KeystoreFormat::Jks);
        store.add_key_entry(PrivateKeyEntry::new(
            "client",
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
            vec![CertificateDer::from(cert.der().to_vec())],
        ));

        let dir = tempfile::tempdir().unwrap();
        let passphrase = dir.path().join("keypass");
        let keystore = dir.path().join("keystore.jks");
        std::fs::write(&passphrase, format!("{}\n", password)).unwrap();
        std::fs::write(&keystore, store.to_jks(password).unwrap()).unwrap();

        Self {
            _dir: dir,
            passphrase,
            keystore,
        }
    }

    pub fn config(&self) -> ClientAuthConfig {
        ClientAuthConfig::new(&self.passphrase, &self.keystore)
    }
}
