//! PEM bundle keystores: certificates plus one unencrypted private key

use clientauth_core::KeystoreError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, read_all, Item};
use std::io::BufReader;
use tracing::debug;

use crate::keystore::{Keystore, KeystoreFormat, PrivateKeyEntry, TrustedCertEntry};

/// Alias given to the key entry of a PEM bundle
pub const PEM_KEY_ALIAS: &str = "pem";

/// Load certificates from PEM-encoded data
pub fn load_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>, KeystoreError> {
    let mut reader = BufReader::new(pem_data);
    certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KeystoreError::Malformed(format!("Failed to parse certificates: {}", e)))
}

/// Decode a PEM bundle.
///
/// All certificates, in file order, form the chain of the bundle's key entry
/// and are also trusted for server verification. The first private key is
/// used; later keys are ignored.
pub fn decode(pem_data: &[u8]) -> Result<Keystore, KeystoreError> {
    let mut reader = BufReader::new(pem_data);
    let items: Vec<Item> = read_all(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| KeystoreError::Malformed(format!("Failed to parse PEM data: {}", e)))?;

    let mut chain = Vec::new();
    let mut private_key = None;
    let mut skipped_keys = 0usize;
    for item in items {
        let key = match item {
            Item::X509Certificate(cert) => {
                chain.push(cert);
                continue;
            }
            Item::Pkcs8Key(k) => PrivateKeyDer::Pkcs8(k),
            Item::Pkcs1Key(k) => PrivateKeyDer::Pkcs1(k),
            Item::Sec1Key(k) => PrivateKeyDer::Sec1(k),
            _ => continue,
        };
        if private_key.is_none() {
            private_key = Some(key);
        } else {
            skipped_keys += 1;
        }
    }

    let private_key = private_key.ok_or(KeystoreError::NoPrivateKey)?;
    if chain.is_empty() {
        return Err(KeystoreError::Malformed(
            "No certificates found in PEM data".to_string(),
        ));
    }
    if skipped_keys > 0 {
        debug!("Ignoring {} additional private key(s) in PEM bundle", skipped_keys);
    }
    debug!("Loaded PEM bundle with {} certificate(s)", chain.len());

    let mut store = Keystore::new(KeystoreFormat::Pem);
    for (i, cert) in chain.iter().enumerate() {
        store.add_trusted_entry(TrustedCertEntry::new(format!("cert-{}", i), cert.clone()));
    }
    store.add_key_entry(PrivateKeyEntry::new(PEM_KEY_ALIAS, private_key, chain));
    Ok(store)
}
