//! In-memory keystore model shared by the JKS and PEM loaders

use chrono::{DateTime, Utc};
use clientauth_core::KeystoreError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::{jks, pem};

/// Container format of a keystore file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeystoreFormat {
    /// Java KeyStore binary container
    Jks,
    /// Text bundle of PEM blocks
    Pem,
}

impl KeystoreFormat {
    /// Detect the container format from its leading bytes
    pub fn detect(data: &[u8]) -> Result<Self, KeystoreError> {
        if data.len() >= 4 {
            let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            match magic {
                jks::JKS_MAGIC => return Ok(KeystoreFormat::Jks),
                jks::JCEKS_MAGIC => {
                    return Err(KeystoreError::UnsupportedFormat(
                        "JCEKS keystores are not supported; convert to JKS or PEM".to_string(),
                    ))
                }
                _ => {}
            }
        }

        let text_start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        if data[text_start..].starts_with(b"-----BEGIN") {
            return Ok(KeystoreFormat::Pem);
        }

        if data.first() == Some(&0x30) {
            return Err(KeystoreError::UnsupportedFormat(
                "DER/PKCS#12 keystores are not supported; convert to JKS or PEM".to_string(),
            ));
        }
        Err(KeystoreError::UnsupportedFormat(
            "unrecognised keystore header".to_string(),
        ))
    }
}

/// A private key with the certificate chain presented for it
#[derive(Debug)]
pub struct PrivateKeyEntry {
    pub alias: String,
    pub created: Option<DateTime<Utc>>,
    pub key: PrivateKeyDer<'static>,
    /// Leaf certificate first
    pub chain: Vec<CertificateDer<'static>>,
}

impl PrivateKeyEntry {
    pub fn new(
        alias: impl Into<String>,
        key: PrivateKeyDer<'static>,
        chain: Vec<CertificateDer<'static>>,
    ) -> Self {
        Self {
            alias: alias.into(),
            created: None,
            key,
            chain,
        }
    }

    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }
}

/// A certificate trusted for peer verification
#[derive(Clone, Debug, PartialEq)]
pub struct TrustedCertEntry {
    pub alias: String,
    pub created: Option<DateTime<Utc>>,
    pub cert: CertificateDer<'static>,
}

impl TrustedCertEntry {
    pub fn new(alias: impl Into<String>, cert: CertificateDer<'static>) -> Self {
        Self {
            alias: alias.into(),
            created: None,
            cert,
        }
    }
}

/// Password-protected set of key entries and trusted certificates
#[derive(Debug)]
pub struct Keystore {
    format: KeystoreFormat,
    key_entries: Vec<PrivateKeyEntry>,
    trusted_entries: Vec<TrustedCertEntry>,
}

impl Keystore {
    /// Create an empty keystore
    pub fn new(format: KeystoreFormat) -> Self {
        Self {
            format,
            key_entries: Vec::new(),
            trusted_entries: Vec::new(),
        }
    }

    /// Load a keystore of any supported format, unlocking it with `password`
    pub fn load(data: &[u8], password: &str) -> Result<Self, KeystoreError> {
        let format = KeystoreFormat::detect(data)?;
        debug!("Detected keystore format: {:?}", format);
        match format {
            KeystoreFormat::Jks => jks::decode(data, password),
            KeystoreFormat::Pem => pem::decode(data),
        }
    }

    /// Serialize as a JKS container protected by `password`
    #[cfg(any(test, feature = "test-util"))]
    pub fn to_jks(&self, password: &str) -> Result<Vec<u8>, KeystoreError> {
        jks::encode(self, password)
    }

    pub fn format(&self) -> KeystoreFormat {
        self.format
    }

    pub fn key_entries(&self) -> &[PrivateKeyEntry] {
        &self.key_entries
    }

    pub fn trusted_entries(&self) -> &[TrustedCertEntry] {
        &self.trusted_entries
    }

    pub fn add_key_entry(&mut self, entry: PrivateKeyEntry) {
        self.key_entries.push(entry);
    }

    pub fn add_trusted_entry(&mut self, entry: TrustedCertEntry) {
        self.trusted_entries.push(entry);
    }

    /// Select the key entry to present: by alias (case-insensitive) or the first one
    pub fn key_entry(&self, alias: Option<&str>) -> Result<&PrivateKeyEntry, KeystoreError> {
        match alias {
            Some(alias) => self
                .key_entries
                .iter()
                .find(|e| e.alias.eq_ignore_ascii_case(alias))
                .ok_or_else(|| KeystoreError::AliasNotFound(alias.to_string())),
            None => self.key_entries.first().ok_or(KeystoreError::NoPrivateKey),
        }
    }

    /// Certificates trusted for server verification: every trusted entry
    /// plus the leaf of every key entry, without duplicates
    pub fn trust_anchors(&self) -> Vec<CertificateDer<'static>> {
        let mut anchors: Vec<CertificateDer<'static>> = Vec::new();
        let candidates = self
            .trusted_entries
            .iter()
            .map(|e| &e.cert)
            .chain(self.key_entries.iter().filter_map(|e| e.leaf()));
        for cert in candidates {
            if !anchors.iter().any(|c| c.as_ref() == cert.as_ref()) {
                anchors.push(cert.clone());
            }
        }
        anchors
    }
}
