//! Java KeyStore (JKS) container codec
//!
//! Layout: magic, version, entry count, then per entry a tag, alias (Java
//! modified UTF-8 with a u16 length), creation time in milliseconds and the
//! entry body. The store ends with a SHA-1 digest keyed by the password.
//! Private keys are wrapped by the JKS key protector: a SHA-1 keystream
//! XORed over the PKCS#8 encoding, framed by a salt and an integrity check.

use chrono::{DateTime, Utc};
use clientauth_core::KeystoreError;
#[cfg(any(test, feature = "test-util"))]
use rand::RngCore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha1::{Digest, Sha1};
use tracing::debug;
use x509_parser::oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::der;
use crate::keystore::{Keystore, KeystoreFormat, PrivateKeyEntry, TrustedCertEntry};

pub const JKS_MAGIC: u32 = 0xfeed_feed;
pub const JCEKS_MAGIC: u32 = 0xcece_cece;

const VERSION_1: u32 = 1;
const VERSION_2: u32 = 2;
const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERT: u32 = 2;
const CERT_TYPE_X509: &str = "X.509";
const INTEGRITY_SALT: &[u8] = b"Mighty Aphrodite";

/// 1.3.6.1.4.1.42.2.17.1.1
const KEY_PROTECTOR_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x2a, 0x02, 0x11, 0x01, 0x01];
const SALT_LEN: usize = 20;
const DIGEST_LEN: usize = 20;

/// Decode a JKS container, verifying its integrity digest and unwrapping every key
pub fn decode(data: &[u8], password: &str) -> Result<Keystore, KeystoreError> {
    if data.len() < 12 + DIGEST_LEN {
        return Err(KeystoreError::Truncated);
    }
    let (body, expected_digest) = data.split_at(data.len() - DIGEST_LEN);
    let mut reader = Reader::new(body);

    if reader.u32()? != JKS_MAGIC {
        return Err(KeystoreError::UnsupportedFormat(
            "missing JKS magic number".to_string(),
        ));
    }
    let version = reader.u32()?;
    if version != VERSION_1 && version != VERSION_2 {
        return Err(KeystoreError::Malformed(format!(
            "unsupported JKS version {}",
            version
        )));
    }
    let count = reader.u32()?;

    let mut protected_keys = Vec::new();
    let mut store = Keystore::new(KeystoreFormat::Jks);
    for _ in 0..count {
        let tag = reader.u32()?;
        let alias = reader.utf()?;
        let created = DateTime::<Utc>::from_timestamp_millis(reader.u64()? as i64);
        match tag {
            TAG_PRIVATE_KEY => {
                let len = reader.u32()? as usize;
                let protected = reader.bytes(len)?.to_vec();
                let chain_len = reader.u32()?;
                let mut chain = Vec::new();
                for _ in 0..chain_len {
                    chain.push(reader.certificate(version)?);
                }
                protected_keys.push((alias, created, protected, chain));
            }
            TAG_TRUSTED_CERT => {
                let cert = reader.certificate(version)?;
                store.add_trusted_entry(TrustedCertEntry {
                    alias,
                    created,
                    cert,
                });
            }
            other => {
                return Err(KeystoreError::Malformed(format!(
                    "unknown entry tag {} for alias '{}'",
                    other, alias
                )))
            }
        }
    }
    if !reader.is_empty() {
        return Err(KeystoreError::Malformed(
            "unexpected data before integrity digest".to_string(),
        ));
    }

    let password = password_bytes(password);
    if store_digest(&password, body).as_slice() != expected_digest {
        return Err(KeystoreError::IntegrityCheckFailed);
    }

    for (alias, created, protected, chain) in protected_keys {
        let plain = recover_key(&alias, &protected, &password)?;
        let plain = complete_public_key(&alias, plain, &chain)?;
        debug!(
            "Recovered private key for alias '{}' with {} certificate(s)",
            alias,
            chain.len()
        );
        store.add_key_entry(PrivateKeyEntry {
            alias,
            created,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(plain)),
            chain,
        });
    }

    debug!(
        "Loaded JKS v{} keystore: {} key entr(ies), {} trusted certificate(s)",
        version,
        store.key_entries().len(),
        store.trusted_entries().len()
    );
    Ok(store)
}

/// Encode a keystore as JKS version 2, protecting keys and the store with `password`
#[cfg(any(test, feature = "test-util"))]
pub fn encode(store: &Keystore, password: &str) -> Result<Vec<u8>, KeystoreError> {
    let password = password_bytes(password);
    let now = Utc::now();
    let count = store.key_entries().len() + store.trusted_entries().len();

    let mut writer = Writer::default();
    writer.u32(JKS_MAGIC);
    writer.u32(VERSION_2);
    writer.u32(count as u32);

    for entry in store.key_entries() {
        let plain = match &entry.key {
            PrivateKeyDer::Pkcs8(key) => key.secret_pkcs8_der(),
            _ => {
                return Err(KeystoreError::UnsupportedKeyAlgorithm(format!(
                    "JKS entries hold PKCS#8 keys only (alias '{}')",
                    entry.alias
                )))
            }
        };
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let protected = protect_key(plain, &password, &salt);

        writer.u32(TAG_PRIVATE_KEY);
        writer.utf(&entry.alias)?;
        writer.u64(entry.created.unwrap_or(now).timestamp_millis() as u64);
        writer.u32(protected.len() as u32);
        writer.bytes(&protected);
        writer.u32(entry.chain.len() as u32);
        for cert in &entry.chain {
            writer.certificate(cert)?;
        }
    }

    for entry in store.trusted_entries() {
        writer.u32(TAG_TRUSTED_CERT);
        writer.utf(&entry.alias)?;
        writer.u64(entry.created.unwrap_or(now).timestamp_millis() as u64);
        writer.certificate(&entry.cert)?;
    }

    let mut out = writer.into_inner();
    let digest = store_digest(&password, &out);
    out.extend_from_slice(&digest);
    Ok(out)
}

/// Java `char[]` passwords are hashed as big-endian UTF-16 code units
fn password_bytes(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect()
}

fn store_digest(password: &[u8], body: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(INTEGRITY_SALT);
    hasher.update(body);
    hasher.finalize().to_vec()
}

fn keystream(password: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(len + DIGEST_LEN);
    let mut digest = salt.to_vec();
    while stream.len() < len {
        let mut hasher = Sha1::new();
        hasher.update(password);
        hasher.update(&digest);
        digest = hasher.finalize().to_vec();
        stream.extend_from_slice(&digest);
    }
    stream.truncate(len);
    stream
}

fn key_check(password: &[u8], plain: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(plain);
    hasher.finalize().to_vec()
}

fn recover_key(alias: &str, protected: &[u8], password: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let (oid, encrypted) = der::parse_encrypted_private_key_info(protected)?;
    if oid != KEY_PROTECTOR_OID {
        return Err(KeystoreError::UnsupportedKeyAlgorithm(der::format_oid(oid)));
    }
    if encrypted.len() < SALT_LEN + DIGEST_LEN {
        return Err(KeystoreError::Malformed(format!(
            "protected key for alias '{}' is too short",
            alias
        )));
    }

    let (salt, rest) = encrypted.split_at(SALT_LEN);
    let (cipher, check) = rest.split_at(rest.len() - DIGEST_LEN);
    let plain: Vec<u8> = cipher
        .iter()
        .zip(keystream(password, salt, cipher.len()))
        .map(|(c, k)| c ^ k)
        .collect();

    if key_check(password, &plain).as_slice() != check {
        return Err(KeystoreError::KeyRecoveryFailed(alias.to_string()));
    }
    Ok(plain)
}

/// EC keys written by keytool omit the public point; take it from the leaf certificate
fn complete_public_key(
    alias: &str,
    pkcs8: Vec<u8>,
    chain: &[CertificateDer<'static>],
) -> Result<Vec<u8>, KeystoreError> {
    let completed = der::complete_ec_private_key(&pkcs8, || {
        let leaf = chain.first().ok_or_else(|| {
            KeystoreError::Malformed(format!("key entry '{}' has no certificate", alias))
        })?;
        leaf_ec_point(alias, leaf)
    })?;
    match completed {
        Some(completed) => {
            debug!("Restored EC public key for alias '{}' from its certificate", alias);
            Ok(completed)
        }
        None => Ok(pkcs8),
    }
}

fn leaf_ec_point(alias: &str, leaf: &CertificateDer<'_>) -> Result<Vec<u8>, KeystoreError> {
    let (_, cert) = X509Certificate::from_der(leaf.as_ref()).map_err(|e| {
        KeystoreError::Malformed(format!("certificate for alias '{}': {}", alias, e))
    })?;
    let spki = cert.public_key();
    if spki.algorithm.algorithm != OID_KEY_TYPE_EC_PUBLIC_KEY {
        return Err(KeystoreError::Malformed(format!(
            "EC key for alias '{}' is paired with a non-EC certificate",
            alias
        )));
    }
    Ok(spki.subject_public_key.data.to_vec())
}

#[cfg(any(test, feature = "test-util"))]
fn protect_key(plain: &[u8], password: &[u8], salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut encrypted = Vec::with_capacity(SALT_LEN + plain.len() + DIGEST_LEN);
    encrypted.extend_from_slice(salt);
    encrypted.extend(
        plain
            .iter()
            .zip(keystream(password, salt, plain.len()))
            .map(|(p, k)| p ^ k),
    );
    encrypted.extend(key_check(password, plain));
    der::encode_encrypted_private_key_info(KEY_PROTECTOR_OID, &encrypted)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], KeystoreError> {
        let end = self.pos.checked_add(len).ok_or(KeystoreError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(KeystoreError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, KeystoreError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, KeystoreError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, KeystoreError> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    /// Java `writeUTF`: modified UTF-8, with NUL as `C0 80` and surrogates encoded singly
    fn utf(&mut self) -> Result<String, KeystoreError> {
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        let malformed =
            || KeystoreError::Malformed("alias is not valid modified UTF-8".to_string());

        let mut units = Vec::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(&first) = rest.first() {
            let (unit, width) = match first {
                0x00..=0x7f => (first as u16, 1),
                0xc0..=0xdf => {
                    let second = continuation(rest, 1).ok_or_else(malformed)?;
                    (((first as u16 & 0x1f) << 6) | second, 2)
                }
                0xe0..=0xef => {
                    let second = continuation(rest, 1).ok_or_else(malformed)?;
                    let third = continuation(rest, 2).ok_or_else(malformed)?;
                    (((first as u16 & 0x0f) << 12) | (second << 6) | third, 3)
                }
                _ => return Err(malformed()),
            };
            units.push(unit);
            rest = &rest[width..];
        }
        // Java permits unpaired surrogates; they become U+FFFD
        Ok(String::from_utf16_lossy(&units))
    }

    fn certificate(&mut self, version: u32) -> Result<CertificateDer<'static>, KeystoreError> {
        if version == VERSION_2 {
            let cert_type = self.utf()?;
            if cert_type != CERT_TYPE_X509 {
                return Err(KeystoreError::UnsupportedCertificateType(cert_type));
            }
        }
        let len = self.u32()? as usize;
        Ok(CertificateDer::from(self.bytes(len)?.to_vec()))
    }
}

/// Low six bits of the continuation byte at `index`
fn continuation(raw: &[u8], index: usize) -> Option<u16> {
    raw.get(index)
        .filter(|b| *b & 0xc0 == 0x80)
        .map(|b| (b & 0x3f) as u16)
}

#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
struct Writer {
    out: Vec<u8>,
}

#[cfg(any(test, feature = "test-util"))]
impl Writer {
    fn u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn bytes(&mut self, value: &[u8]) {
        self.out.extend_from_slice(value);
    }

    fn utf(&mut self, value: &str) -> Result<(), KeystoreError> {
        let mut encoded = Vec::with_capacity(value.len());
        for unit in value.encode_utf16() {
            match unit {
                0x0001..=0x007f => encoded.push(unit as u8),
                0x0000 | 0x0080..=0x07ff => {
                    encoded.push(0xc0 | (unit >> 6) as u8);
                    encoded.push(0x80 | (unit & 0x3f) as u8);
                }
                _ => {
                    encoded.push(0xe0 | (unit >> 12) as u8);
                    encoded.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                    encoded.push(0x80 | (unit & 0x3f) as u8);
                }
            }
        }
        let len = u16::try_from(encoded.len())
            .map_err(|_| KeystoreError::Malformed(format!("alias too long: {}", encoded.len())))?;
        self.out.extend_from_slice(&len.to_be_bytes());
        self.out.extend_from_slice(&encoded);
        Ok(())
    }

    fn certificate(&mut self, cert: &CertificateDer<'_>) -> Result<(), KeystoreError> {
        self.utf(CERT_TYPE_X509)?;
        self.u32(cert.len() as u32);
        self.bytes(cert);
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.out
    }
}
