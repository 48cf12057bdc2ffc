//! TLS client-auth context construction
//!
//! Loads a keystore (JKS or PEM bundle) unlocked by a passphrase file and
//! turns it into a rustls client configuration that presents the client
//! certificate and applies the selected server trust policy.

pub mod algorithm;
mod der;
pub mod context;
pub mod jks;
pub mod keystore;
pub mod pem;
pub mod trust;

#[cfg(test)]
pub(crate) mod testutil;

pub use algorithm::TlsAlgorithm;
pub use context::{Passphrase, TlsContext, TlsContextBuilder};
pub use keystore::{Keystore, KeystoreFormat, PrivateKeyEntry, TrustedCertEntry};
pub use trust::{AcceptAnyServerCert, TrustPolicy};
