//! Client-auth configuration values

use crate::{ClientAuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Folder holding the default key material, relative to the working directory
pub const USER_DATA_FOLDER: &str = "userdata/";

/// Default file name of the private key passphrase
pub const DEFAULT_PASSPHRASE_FILE: &str = "keypass";

/// Default file name of the keystore
pub const DEFAULT_KEYSTORE_FILE: &str = "keystore.jks";

/// Default protocol identifier
pub const DEFAULT_ALGORITHM: &str = "TLS";

/// Server certificates are not verified unless asked for
pub const DEFAULT_VERIFY_SERVER_CERT: bool = false;

/// Key material location and trust policy for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientAuthConfig {
    /// File whose trimmed content unlocks the keystore and the private key
    #[serde(default = "default_passphrase_path")]
    pub passphrase_path: PathBuf,

    /// JKS keystore or PEM bundle with the client certificate
    #[serde(default = "default_keystore_path")]
    pub keystore_path: PathBuf,

    /// Protocol identifier, e.g. "TLS" or "TLSv1.3"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Verify the server against the keystore's trust entries
    #[serde(default)]
    pub verify_server_cert: bool,

    /// Key entry to present; the first key entry when unset
    #[serde(default)]
    pub key_alias: Option<String>,
}

fn default_passphrase_path() -> PathBuf {
    PathBuf::from(format!("{}{}", USER_DATA_FOLDER, DEFAULT_PASSPHRASE_FILE))
}

fn default_keystore_path() -> PathBuf {
    PathBuf::from(format!("{}{}", USER_DATA_FOLDER, DEFAULT_KEYSTORE_FILE))
}

fn default_algorithm() -> String {
    DEFAULT_ALGORITHM.to_string()
}

impl Default for ClientAuthConfig {
    fn default() -> Self {
        Self {
            passphrase_path: default_passphrase_path(),
            keystore_path: default_keystore_path(),
            algorithm: default_algorithm(),
            verify_server_cert: DEFAULT_VERIFY_SERVER_CERT,
            key_alias: None,
        }
    }
}

impl ClientAuthConfig {
    /// Create a configuration for the given files with default algorithm and trust policy
    pub fn new(passphrase_path: impl Into<PathBuf>, keystore_path: impl Into<PathBuf>) -> Self {
        Self {
            passphrase_path: passphrase_path.into(),
            keystore_path: keystore_path.into(),
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_verify_server_cert(mut self, verify_server_cert: bool) -> Self {
        self.verify_server_cert = verify_server_cert;
        self
    }

    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = Some(alias.into());
        self
    }
}

/// Connect and request timeouts of the fast and slow pools, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolTimeouts {
    #[serde(default = "default_fast_timeout_ms")]
    pub fast_connect_timeout_ms: u64,
    #[serde(default = "default_fast_timeout_ms")]
    pub fast_request_timeout_ms: u64,
    #[serde(default = "default_slow_timeout_ms")]
    pub slow_connect_timeout_ms: u64,
    #[serde(default = "default_slow_timeout_ms")]
    pub slow_request_timeout_ms: u64,
}

fn default_fast_timeout_ms() -> u64 {
    15_000
}

fn default_slow_timeout_ms() -> u64 {
    60_000
}

impl Default for PoolTimeouts {
    fn default() -> Self {
        Self {
            fast_connect_timeout_ms: default_fast_timeout_ms(),
            fast_request_timeout_ms: default_fast_timeout_ms(),
            slow_connect_timeout_ms: default_slow_timeout_ms(),
            slow_request_timeout_ms: default_slow_timeout_ms(),
        }
    }
}

impl PoolTimeouts {
    pub fn fast_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_connect_timeout_ms)
    }

    pub fn fast_request_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_request_timeout_ms)
    }

    pub fn slow_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_connect_timeout_ms)
    }

    pub fn slow_request_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_request_timeout_ms)
    }

    /// Reject zero timeouts, which would fail every request
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("fast_connect_timeout_ms", self.fast_connect_timeout_ms),
            ("fast_request_timeout_ms", self.fast_request_timeout_ms),
            ("slow_connect_timeout_ms", self.slow_connect_timeout_ms),
            ("slow_request_timeout_ms", self.slow_request_timeout_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ClientAuthError::InvalidConfiguration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Full settings document: key material plus pool timeouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientAuthSettings {
    #[serde(default)]
    pub client_auth: ClientAuthConfig,
    #[serde(default)]
    pub timeouts: PoolTimeouts,
}

impl ClientAuthSettings {
    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ClientAuthError::InvalidConfiguration(format!("invalid YAML: {}", e)))
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ClientAuthError::InvalidConfiguration(format!(
                "cannot read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        let settings = Self::from_yaml_str(&yaml)?;
        tracing::debug!("Loaded client auth settings from {}", path.display());
        Ok(settings)
    }

    /// Validate paths and timeouts
    pub fn validate(&self) -> Result<()> {
        if self.client_auth.passphrase_path.as_os_str().is_empty() {
            return Err(ClientAuthError::InvalidConfiguration(
                "passphrase_path must not be empty".to_string(),
            ));
        }
        if self.client_auth.keystore_path.as_os_str().is_empty() {
            return Err(ClientAuthError::InvalidConfiguration(
                "keystore_path must not be empty".to_string(),
            ));
        }
        if self.client_auth.algorithm.trim().is_empty() {
            return Err(ClientAuthError::InvalidConfiguration(
                "algorithm must not be empty".to_string(),
            ));
        }
        self.timeouts.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientAuthConfig::default();
        assert_eq!(config.passphrase_path, PathBuf::from("userdata/keypass"));
        assert_eq!(config.keystore_path, PathBuf::from("userdata/keystore.jks"));
        assert_eq!(config.algorithm, "TLS");
        assert!(!config.verify_server_cert);
        assert_eq!(config.key_alias, None);
    }

    #[test]
    fn test_config_builders() {
        let config = ClientAuthConfig::new("/etc/pki/pass", "/etc/pki/client.jks")
            .with_algorithm("TLSv1.3")
            .with_verify_server_cert(true)
            .with_key_alias("client");

        assert_eq!(config.passphrase_path, PathBuf::from("/etc/pki/pass"));
        assert_eq!(config.keystore_path, PathBuf::from("/etc/pki/client.jks"));
        assert_eq!(config.algorithm, "TLSv1.3");
        assert!(config.verify_server_cert);
        assert_eq!(config.key_alias.as_deref(), Some("client"));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = PoolTimeouts::default();
        assert_eq!(timeouts.fast_connect_timeout(), Duration::from_secs(15));
        assert_eq!(timeouts.fast_request_timeout(), Duration::from_secs(15));
        assert_eq!(timeouts.slow_connect_timeout(), Duration::from_secs(60));
        assert_eq!(timeouts.slow_request_timeout(), Duration::from_secs(60));
        assert!(timeouts.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let timeouts = PoolTimeouts {
            slow_request_timeout_ms: 0,
            ..PoolTimeouts::default()
        };
        let err = timeouts.validate().unwrap_err();
        assert!(err.to_string().contains("slow_request_timeout_ms"));
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = r#"
client_auth:
  keystore_path: /srv/pki/client.jks
  verify_server_cert: true
timeouts:
  fast_request_timeout_ms: 2500
"#;
        let settings = ClientAuthSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(
            settings.client_auth.keystore_path,
            PathBuf::from("/srv/pki/client.jks")
        );
        assert_eq!(
            settings.client_auth.passphrase_path,
            PathBuf::from("userdata/keypass")
        );
        assert!(settings.client_auth.verify_server_cert);
        assert_eq!(settings.timeouts.fast_request_timeout_ms, 2500);
        assert_eq!(settings.timeouts.fast_connect_timeout_ms, 15_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_reject_unknown_fields() {
        let yaml = "client_auth:\n  keystore: /tmp/x.jks\n";
        assert!(ClientAuthSettings::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_settings_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientAuthSettings::from_yaml_file(&dir.path().join("absent.yaml"));
        assert!(matches!(
            result,
            Err(ClientAuthError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_settings_validate_empty_path() {
        let mut settings = ClientAuthSettings::default();
        settings.client_auth.keystore_path = PathBuf::new();
        assert!(settings.validate().is_err());
    }
}
