//! TLS client-auth context: client certificate presentation plus server trust policy

use clientauth_core::{
    ClientAuthConfig, ClientAuthError, FileSource, KeyMaterial, KeystoreError, LocalFiles, Result,
};
use rustls::ClientConfig;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::algorithm::TlsAlgorithm;
use crate::keystore::{Keystore, KeystoreFormat};
use crate::trust::{build_root_store, AcceptAnyServerCert, TrustPolicy};

/// Secret read from the passphrase file, trimmed of surrounding whitespace
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

/// Immutable client TLS context shared by the fast and slow pools.
///
/// Every context presents its key entry's certificate chain when a server
/// requests client authentication.
#[derive(Clone, Debug)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    algorithm: TlsAlgorithm,
    trust_policy: TrustPolicy,
    keystore_format: KeystoreFormat,
    key_alias: String,
    chain_len: usize,
    trust_anchor_count: usize,
    leaf_fingerprint: String,
}

impl TlsContext {
    /// Build a context from an already loaded keystore
    pub fn from_keystore(
        keystore: &Keystore,
        key_alias: Option<&str>,
        algorithm: TlsAlgorithm,
        trust_policy: TrustPolicy,
    ) -> Result<Self> {
        let entry = keystore.key_entry(key_alias)?;
        let leaf = entry.leaf().ok_or_else(|| {
            KeystoreError::Malformed(format!(
                "key entry '{}' has no certificate chain",
                entry.alias
            ))
        })?;
        let leaf_fingerprint = hex::encode(Sha256::digest(leaf.as_ref()));

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(algorithm.protocol_versions())?;

        let mut trust_anchor_count = 0;
        let builder = match trust_policy {
            TrustPolicy::VerifyWithKeystore => {
                let roots = build_root_store(&keystore.trust_anchors());
                if roots.is_empty() {
                    warn!(
                        "Server verification enabled but the keystore holds no usable trust anchors"
                    );
                }
                trust_anchor_count = roots.len();
                builder.with_root_certificates(roots)
            }
            TrustPolicy::AcceptAny => {
                warn!(
                    "Server certificate verification disabled: \
                     any server certificate and hostname will be accepted"
                );
                let verifier = Arc::new(AcceptAnyServerCert::new(provider));
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(verifier)
            }
        };

        let mut config =
            builder.with_client_auth_cert(entry.chain.clone(), entry.key.clone_key())?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
            algorithm,
            trust_policy,
            keystore_format: keystore.format(),
            key_alias: entry.alias.clone(),
            chain_len: entry.chain.len(),
            trust_anchor_count,
            leaf_fingerprint,
        })
    }

    /// The rustls configuration to install into HTTP clients
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.config.clone()
    }

    pub fn algorithm(&self) -> TlsAlgorithm {
        self.algorithm
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        self.trust_policy
    }

    pub fn keystore_format(&self) -> KeystoreFormat {
        self.keystore_format
    }

    /// Alias of the key entry presented to servers
    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Number of trust anchors; zero when server verification is disabled
    pub fn trust_anchor_count(&self) -> usize {
        self.trust_anchor_count
    }

    /// Hex SHA-256 of the presented leaf certificate
    pub fn leaf_fingerprint(&self) -> &str {
        &self.leaf_fingerprint
    }
}

/// Builds a [`TlsContext`] from a passphrase file and a keystore file
#[derive(Clone)]
pub struct TlsContextBuilder {
    passphrase_path: PathBuf,
    keystore_path: PathBuf,
    algorithm: String,
    verify_server_cert: bool,
    key_alias: Option<String>,
    files: Arc<dyn FileSource>,
}

impl TlsContextBuilder {
    /// Create a builder with the "TLS" algorithm and server verification disabled
    pub fn new(passphrase_path: impl Into<PathBuf>, keystore_path: impl Into<PathBuf>) -> Self {
        Self::from_config(&ClientAuthConfig::new(passphrase_path, keystore_path))
    }

    pub fn from_config(config: &ClientAuthConfig) -> Self {
        Self {
            passphrase_path: config.passphrase_path.clone(),
            keystore_path: config.keystore_path.clone(),
            algorithm: config.algorithm.clone(),
            verify_server_cert: config.verify_server_cert,
            key_alias: config.key_alias.clone(),
            files: Arc::new(LocalFiles),
        }
    }

    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn verify_server_cert(mut self, verify_server_cert: bool) -> Self {
        self.verify_server_cert = verify_server_cert;
        self
    }

    pub fn key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = Some(alias.into());
        self
    }

    pub fn file_source(mut self, files: Arc<dyn FileSource>) -> Self {
        self.files = files;
        self
    }

    pub fn passphrase_path(&self) -> &Path {
        &self.passphrase_path
    }

    pub fn keystore_path(&self) -> &Path {
        &self.keystore_path
    }

    /// Check that the passphrase file and then the keystore file exist
    pub fn check_files(&self) -> Result<()> {
        if !self.files.file_exists(&self.passphrase_path) {
            error!(
                "Private key passphrase file does not exist on {}. \
                 Cannot load the client auth client. \
                 Put the passphrase file at that path and try again.",
                self.passphrase_path.display()
            );
            return Err(ClientAuthError::MissingFile {
                kind: KeyMaterial::Passphrase,
                path: self.passphrase_path.clone(),
            });
        }

        if !self.files.file_exists(&self.keystore_path) {
            error!(
                "Keystore file does not exist on {}. Cannot load the client auth client. \
                 Put the keystore file at that path and try again.",
                self.keystore_path.display()
            );
            return Err(ClientAuthError::MissingFile {
                kind: KeyMaterial::Keystore,
                path: self.keystore_path.clone(),
            });
        }
        Ok(())
    }

    /// Build the context. Every failure is logged and returned; nothing is cached.
    pub fn build(&self) -> Result<TlsContext> {
        self.check_files()?;
        match self.load_and_build() {
            Ok(context) => {
                info!(
                    key_alias = %context.key_alias(),
                    fingerprint = %context.leaf_fingerprint(),
                    algorithm = %context.algorithm(),
                    trust_policy = ?context.trust_policy(),
                    "TLS client-auth context created"
                );
                Ok(context)
            }
            Err(e) => {
                error!("Failed to build TLS client-auth context: {}", e);
                Err(e)
            }
        }
    }

    fn load_and_build(&self) -> Result<TlsContext> {
        let algorithm = TlsAlgorithm::parse(&self.algorithm)?;
        let passphrase = self.read_passphrase()?;
        info!("Loaded private key passphrase from {}", self.passphrase_path.display());

        let data = self.read_keystore()?;
        let keystore = Keystore::load(&data, passphrase.expose())?;
        debug!(
            "Keystore {} loaded: {} key entr(ies), {} trusted certificate(s)",
            self.keystore_path.display(),
            keystore.key_entries().len(),
            keystore.trusted_entries().len()
        );

        TlsContext::from_keystore(
            &keystore,
            self.key_alias.as_deref(),
            algorithm,
            TrustPolicy::from_verify_flag(self.verify_server_cert),
        )
    }

    fn read_passphrase(&self) -> Result<Passphrase> {
        let raw = self
            .files
            .read_to_string(&self.passphrase_path)
            .map_err(|source| ClientAuthError::Io {
                kind: KeyMaterial::Passphrase,
                path: self.passphrase_path.clone(),
                source,
            })?;
        Ok(Passphrase::new(&raw))
    }

    /// Read the whole keystore; the stream is dropped before this returns
    fn read_keystore(&self) -> Result<Vec<u8>> {
        let io_error = |source| ClientAuthError::Io {
            kind: KeyMaterial::Keystore,
            path: self.keystore_path.clone(),
            source,
        };
        let mut stream = self.files.open_stream(&self.keystore_path).map_err(io_error)?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).map_err(io_error)?;
        Ok(data)
    }
}

impl fmt::Debug for TlsContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContextBuilder")
            .field("passphrase_path", &self.passphrase_path)
            .field("keystore_path", &self.keystore_path)
            .field("algorithm", &self.algorithm)
            .field("verify_server_cert", &self.verify_server_cert)
            .field("key_alias", &self.key_alias)
            .finish()
    }
}
