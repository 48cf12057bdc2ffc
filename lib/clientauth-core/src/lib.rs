//! Core configuration and error types for mutual-TLS client pools
//!
//! This library provides:
//! - Client-auth configuration values and their defaults
//! - Pool timeout settings for the fast and slow client pools
//! - The error taxonomy shared by the TLS and HTTP layers
//! - The file-source seam used to read key material

pub mod config;
pub mod error;
pub mod files;

pub use config::{ClientAuthConfig, ClientAuthSettings, PoolTimeouts};
pub use error::{ClientAuthError, KeyMaterial, KeystoreError, PoolKind, Result};
pub use files::{FileSource, LocalFiles};
