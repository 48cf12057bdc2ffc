//! Minimal DER support for JKS key material: the `EncryptedPrivateKeyInfo`
//! wrapper and the PKCS#8 EC keys it protects

use clientauth_core::KeystoreError;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OCTET_STRING: u8 = 0x04;
#[cfg(any(test, feature = "test-util"))]
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_EC_PARAMETERS: u8 = 0xa0;
const TAG_EC_PUBLIC_KEY: u8 = 0xa1;

/// 1.2.840.10045.2.1
const EC_PUBLIC_KEY_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];

struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    fn byte(&mut self) -> Result<u8, KeystoreError> {
        let b = *self.data.get(self.pos).ok_or(KeystoreError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, KeystoreError> {
        let first = self.byte()?;
        if first < 0x80 {
            return Ok(first as usize);
        }
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 4 {
            return Err(KeystoreError::Malformed(
                "unsupported DER length encoding".to_string(),
            ));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.byte()? as usize;
        }
        Ok(len)
    }

    /// Read one element, checking its tag, and return its content
    fn expect(&mut self, tag: u8) -> Result<&'a [u8], KeystoreError> {
        let actual = self.byte()?;
        if actual != tag {
            return Err(KeystoreError::Malformed(format!(
                "expected DER tag 0x{:02x}, found 0x{:02x}",
                tag, actual
            )));
        }
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(KeystoreError::Truncated)?;
        let content = self.data.get(self.pos..end).ok_or(KeystoreError::Truncated)?;
        self.pos = end;
        Ok(content)
    }
}

/// Split an `EncryptedPrivateKeyInfo` into its algorithm OID and encrypted bytes
pub(crate) fn parse_encrypted_private_key_info(
    data: &[u8],
) -> Result<(&[u8], &[u8]), KeystoreError> {
    let mut outer = DerReader::new(data);
    let info = outer.expect(TAG_SEQUENCE)?;

    let mut fields = DerReader::new(info);
    let algorithm = fields.expect(TAG_SEQUENCE)?;
    let encrypted = fields.expect(TAG_OCTET_STRING)?;

    let mut algorithm = DerReader::new(algorithm);
    let oid = algorithm.expect(TAG_OID)?;
    // parameters are NULL or absent for the key protector

    if !fields.is_empty() {
        return Err(KeystoreError::Malformed(
            "unexpected data after encrypted key".to_string(),
        ));
    }
    Ok((oid, encrypted))
}

/// Encode an `EncryptedPrivateKeyInfo` with NULL algorithm parameters
#[cfg(any(test, feature = "test-util"))]
pub(crate) fn encode_encrypted_private_key_info(oid: &[u8], encrypted: &[u8]) -> Vec<u8> {
    let mut algorithm = encode_element(TAG_OID, oid);
    algorithm.extend_from_slice(&[TAG_NULL, 0x00]);

    let mut info = encode_element(TAG_SEQUENCE, &algorithm);
    info.extend(encode_element(TAG_OCTET_STRING, encrypted));
    encode_element(TAG_SEQUENCE, &info)
}

/// Add the `publicKey` field to a PKCS#8 EC key that lacks it.
///
/// keytool writes `ECPrivateKey` as version and scalar only, while ring
/// refuses keys without the public point. `public_key` supplies the point
/// (normally the leaf certificate's `subjectPublicKey`) and is only called
/// when it is needed. Returns `None` for keys that need no change.
pub(crate) fn complete_ec_private_key(
    pkcs8: &[u8],
    public_key: impl FnOnce() -> Result<Vec<u8>, KeystoreError>,
) -> Result<Option<Vec<u8>>, KeystoreError> {
    let mut outer = DerReader::new(pkcs8);
    let mut info = DerReader::new(outer.expect(TAG_SEQUENCE)?);
    let version = info.expect(TAG_INTEGER)?;
    let algorithm = info.expect(TAG_SEQUENCE)?;
    let private_key = info.expect(TAG_OCTET_STRING)?;
    let attributes = info.remaining();

    let mut algorithm_fields = DerReader::new(algorithm);
    if algorithm_fields.expect(TAG_OID)? != EC_PUBLIC_KEY_OID {
        return Ok(None);
    }
    let curve = match algorithm_fields.peek() {
        Some(TAG_OID) => Some(algorithm_fields.expect(TAG_OID)?),
        _ => None,
    };

    let mut ec_outer = DerReader::new(private_key);
    let mut ec = DerReader::new(ec_outer.expect(TAG_SEQUENCE)?);
    let ec_version = ec.expect(TAG_INTEGER)?;
    let scalar = ec.expect(TAG_OCTET_STRING)?;
    let parameters = match ec.peek() {
        Some(TAG_EC_PARAMETERS) => Some(ec.expect(TAG_EC_PARAMETERS)?),
        _ => None,
    };
    if ec.peek() == Some(TAG_EC_PUBLIC_KEY) {
        return Ok(None);
    }

    // older JDKs drop leading zero bytes of the scalar
    let mut padded = Vec::with_capacity(scalar.len());
    if let Some(len) = curve.and_then(curve_scalar_len) {
        padded.resize(len.saturating_sub(scalar.len()), 0);
    }
    padded.extend_from_slice(scalar);

    let mut point = vec![0x00];
    point.extend(public_key()?);

    let mut rebuilt = encode_element(TAG_INTEGER, ec_version);
    rebuilt.extend(encode_element(TAG_OCTET_STRING, &padded));
    if let Some(parameters) = parameters {
        rebuilt.extend(encode_element(TAG_EC_PARAMETERS, parameters));
    }
    rebuilt.extend(encode_element(
        TAG_EC_PUBLIC_KEY,
        &encode_element(TAG_BIT_STRING, &point),
    ));

    let mut fields = encode_element(TAG_INTEGER, version);
    fields.extend(encode_element(TAG_SEQUENCE, algorithm));
    fields.extend(encode_element(
        TAG_OCTET_STRING,
        &encode_element(TAG_SEQUENCE, &rebuilt),
    ));
    fields.extend_from_slice(attributes);
    Ok(Some(encode_element(TAG_SEQUENCE, &fields)))
}

fn curve_scalar_len(curve: &[u8]) -> Option<usize> {
    match curve {
        // 1.2.840.10045.3.1.7 (P-256)
        [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07] => Some(32),
        // 1.3.132.0.34 (P-384)
        [0x2b, 0x81, 0x04, 0x00, 0x22] => Some(48),
        _ => None,
    }
}

fn encode_element(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (4 - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Render an encoded OID as dotted decimal for error messages
pub(crate) fn format_oid(oid: &[u8]) -> String {
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    for b in oid {
        value = (value << 7) | (b & 0x7f) as u64;
        if b & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    arcs.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
