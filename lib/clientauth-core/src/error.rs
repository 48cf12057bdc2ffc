use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientAuthError>;

/// Which on-disk input an error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    Passphrase,
    Keystore,
}

impl fmt::Display for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Passphrase => f.write_str("private key passphrase"),
            KeyMaterial::Keystore => f.write_str("keystore"),
        }
    }
}

/// The two client pools built by a factory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Fast,
    Slow,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Fast => f.write_str("fast"),
            PoolKind::Slow => f.write_str("slow"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientAuthError {
    #[error("{kind} file does not exist: {}", path.display())]
    MissingFile { kind: KeyMaterial, path: PathBuf },

    #[error("Failed to read {kind} file {}: {source}", path.display())]
    Io {
        kind: KeyMaterial,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Keystore load failure: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Unsupported TLS algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("HTTP client construction failed: {0}")]
    ClientConstruction(String),

    #[error("Client pool {0} is closed")]
    PoolClosed(PoolKind),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ClientAuthError {
    /// True when the failure happened before any key material was read
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ClientAuthError::MissingFile { .. })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("Unsupported keystore format: {0}")]
    UnsupportedFormat(String),

    #[error("Keystore data is truncated")]
    Truncated,

    #[error("Keystore was tampered with, or password was incorrect")]
    IntegrityCheckFailed,

    #[error("Cannot recover private key for entry '{0}': wrong password or corrupted key")]
    KeyRecoveryFailed(String),

    #[error("Unsupported key protection algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    #[error("Unsupported certificate type: {0}")]
    UnsupportedCertificateType(String),

    #[error("Malformed keystore: {0}")]
    Malformed(String),

    #[error("No private key entry found in keystore")]
    NoPrivateKey,

    #[error("Key alias not found in keystore: {0}")]
    AliasNotFound(String),
}
