//! Tamper-evident, time-limited tokens.
//!
//! A signed token has three dot-separated parts, each URL-safe base64 without
//! padding:
//!
//! 1. the payload,
//! 2. the signing time in unix seconds, big-endian with leading zero bytes
//!    trimmed,
//! 3. an HMAC-SHA256 tag over the first two parts.
//!
//! Tokens are safe to store in cookies as-is.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::hmac::{self, Key, HMAC_SHA256};
use time::{Duration, OffsetDateTime};

use crate::config::ConfigError;

const DEFAULT_SALT: &str = "axum-auth-chain.signer";
const SEPARATOR: char = '.';

/// Reasons a token is rejected by [`Signer::unsign`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// The token was tampered with, signed with another key, or is malformed.
    #[error("bad signature")]
    BadSignature,

    /// The signature is valid but older than the allowed age, or dated in the
    /// future.
    #[error("signature age {age} is outside max age {max_age}")]
    SignatureExpired {
        /// Age of the token when it was checked.
        age: Duration,
        /// Maximum age that was allowed.
        max_age: Duration,
    },
}

/// Produces and verifies signed tokens and keyed digests.
///
/// ```rust
/// use axum_auth_chain::Signer;
/// use time::Duration;
///
/// let signer = Signer::new(b"secret").unwrap();
/// let token = signer.sign("ferris");
///
/// assert_eq!(signer.unsign(&token, Some(Duration::minutes(5))).unwrap(), "ferris");
/// ```
#[derive(Debug, Clone)]
pub struct Signer {
    key: Key,
}

impl Signer {
    /// Creates a signer from the application secret.
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        Self::with_salt(secret, DEFAULT_SALT)
    }

    /// Creates a signer whose key is bound to `salt` as well as the secret.
    pub fn with_salt(secret: &[u8], salt: &str) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Self::salted(&Key::new(HMAC_SHA256, secret), salt))
    }

    /// Derives an independent signer for a single purpose.
    ///
    /// Tokens and digests from one derived signer never verify under another.
    pub fn derive(&self, salt: &str) -> Self {
        Self::salted(&self.key, salt)
    }

    fn salted(parent: &Key, salt: &str) -> Self {
        let derived = hmac::sign(parent, salt.as_bytes());
        Self {
            key: Key::new(HMAC_SHA256, derived.as_ref()),
        }
    }

    /// Signs `payload` with the current time.
    pub fn sign(&self, payload: &str) -> String {
        self.sign_at(payload, OffsetDateTime::now_utc())
    }

    /// Signs `payload` as if it were signed at `timestamp`.
    pub fn sign_at(&self, payload: &str, timestamp: OffsetDateTime) -> String {
        let value = format!(
            "{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(payload),
            encode_timestamp(timestamp.unix_timestamp())
        );
        let tag = hmac::sign(&self.key, value.as_bytes());

        format!("{value}{SEPARATOR}{}", URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    /// Verifies `token` and returns its payload.
    ///
    /// When `max_age` is given, tokens signed longer ago than that are
    /// rejected with [`SigningError::SignatureExpired`].
    pub fn unsign(&self, token: &str, max_age: Option<Duration>) -> Result<String, SigningError> {
        self.unsign_at(token, max_age, OffsetDateTime::now_utc())
    }

    /// Like [`unsign`](Self::unsign), measuring age against `now`.
    pub fn unsign_at(
        &self,
        token: &str,
        max_age: Option<Duration>,
        now: OffsetDateTime,
    ) -> Result<String, SigningError> {
        let (value, tag) = token
            .rsplit_once(SEPARATOR)
            .ok_or(SigningError::BadSignature)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| SigningError::BadSignature)?;
        hmac::verify(&self.key, value.as_bytes(), &tag).map_err(|_| SigningError::BadSignature)?;

        let (payload, timestamp) = value
            .rsplit_once(SEPARATOR)
            .ok_or(SigningError::BadSignature)?;
        let timestamp = decode_timestamp(timestamp).ok_or(SigningError::BadSignature)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(SigningError::BadSignature)?;

        if let Some(max_age) = max_age {
            let age = Duration::seconds(now.unix_timestamp().saturating_sub(timestamp));
            if age > max_age || age.is_negative() {
                return Err(SigningError::SignatureExpired { age, max_age });
            }
        }

        Ok(payload)
    }

    /// Returns an encoded HMAC of `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(hmac::sign(&self.key, data).as_ref())
    }

    /// Checks `digest` against `data` in constant time.
    pub fn verify_digest(&self, data: &[u8], digest: &str) -> bool {
        URL_SAFE_NO_PAD
            .decode(digest)
            .is_ok_and(|tag| hmac::verify(&self.key, data, &tag).is_ok())
    }
}

fn encode_timestamp(timestamp: i64) -> String {
    let bytes = timestamp.to_be_bytes();
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    URL_SAFE_NO_PAD.encode(&bytes[start..])
}

fn decode_timestamp(encoded: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }

    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(&bytes);
    Some(i64::from_be_bytes(buf))
}
