//! Random identifiers, continuation credentials and access tokens.
//!
//! All values are drawn from the operating system RNG and encoded as
//! unpadded base64url. Grant identifiers carry 128 bits of entropy, secrets
//! and access tokens 256 bits. Only SHA-256 digests of secrets and tokens are
//! ever persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Entropy of a grant identifier, in bytes
pub const GRANT_ID_BYTES: usize = 16;
/// Entropy of a continuation secret or an access token, in bytes
pub const SECRET_BYTES: usize = 32;

const CREDENTIAL_SEPARATOR: char = '.';

fn random_encoded(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Length of the base64url encoding of `bytes` bytes without padding
const fn encoded_len(bytes: usize) -> usize {
    (bytes * 4).div_ceil(3)
}

fn is_encoded(value: &str, bytes: usize) -> bool {
    value.len() == encoded_len(bytes)
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Hex encoded SHA-256 digest
pub fn digest(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Compares two strings without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Identifier of a pending grant, also used as the interaction `txnID`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantId(String);

impl GrantId {
    pub fn generate() -> Self {
        Self(random_encoded(GRANT_ID_BYTES))
    }

    /// Accepts only values shaped like a generated identifier
    pub fn parse(value: &str) -> Option<Self> {
        is_encoded(value, GRANT_ID_BYTES).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential presented on the continue endpoint: `<grant id>.<secret>`.
///
/// The grant identifier half binds the credential to exactly one pending
/// grant; the secret half proves possession and is checked against the
/// digest stored with that grant.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuationCredential {
    grant_id: GrantId,
    secret: String,
}

impl ContinuationCredential {
    /// Mints a fresh credential for the given grant
    pub fn issue(grant_id: GrantId) -> Self {
        Self {
            grant_id,
            secret: random_encoded(SECRET_BYTES),
        }
    }

    /// Splits a presented credential; `None` when it is not well formed
    pub fn parse(value: &str) -> Option<Self> {
        let (grant_id, secret) = value.split_once(CREDENTIAL_SEPARATOR)?;
        let grant_id = GrantId::parse(grant_id)?;
        is_encoded(secret, SECRET_BYTES).then(|| Self {
            grant_id,
            secret: secret.to_string(),
        })
    }

    pub fn grant_id(&self) -> &GrantId {
        &self.grant_id
    }

    pub fn secret_digest(&self) -> String {
        digest(&self.secret)
    }

    /// Checks the secret against a stored digest
    pub fn matches(&self, secret_digest: &str) -> bool {
        constant_time_eq(&self.secret_digest(), secret_digest)
    }

    pub fn value(&self) -> String {
        format!("{}{}{}", self.grant_id, CREDENTIAL_SEPARATOR, self.secret)
    }
}

impl fmt::Debug for ContinuationCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationCredential")
            .field("grant_id", &self.grant_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Access token value handed to clients
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTokenValue(String);

impl AccessTokenValue {
    pub fn generate() -> Self {
        Self(random_encoded(SECRET_BYTES))
    }

    /// Accepts only values shaped like a generated token
    pub fn parse(value: &str) -> Option<Self> {
        is_encoded(value, SECRET_BYTES).then(|| Self(value.to_string()))
    }

    /// Store key of the grant issued with this token
    pub fn digest(&self) -> String {
        digest(&self.0)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AccessTokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessTokenValue(<redacted>)")
    }
}

/// Random value used as interaction nonce or reference
pub fn generate_nonce() -> String {
    random_encoded(SECRET_BYTES)
}
