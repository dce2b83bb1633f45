//! Signed identity payload stored on every tag.
//!
//! Wire format (ASCII):
//! ```text
//! <identity>:<hex(HMAC-SHA256(secret, identity))>
//! ```
//!
//! The signature is always 64 lowercase hex characters.  A tag written with
//! a different secret is indistinguishable from a corrupted one: both fail
//! [`PayloadCodec::verify`] and the identity is never returned.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the identity and its signature.
pub const SEPARATOR: char = ':';

/// Length of the hex-encoded signature.
pub const SIGNATURE_HEX_LEN: usize = 64;

/// Errors produced while building or checking a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The secret could not be used as an HMAC key.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The payload has no `:` separator.
    #[error("payload has no signature separator")]
    MissingSeparator,

    /// The signature does not match the identity.
    #[error("payload signature does not match")]
    SignatureMismatch,
}

/// Signs and verifies tag payloads with a process-wide shared secret.
///
/// The keyed MAC state is built once in [`PayloadCodec::new`] and cloned for
/// every signature, so signing never re-derives the key.
///
/// # Examples
///
/// ```rust
/// use nfc_core::PayloadCodec;
///
/// let codec = PayloadCodec::new(b"secret").unwrap();
/// let payload = codec.encode("42");
/// assert_eq!(codec.verify(&payload).unwrap(), "42");
/// ```
#[derive(Clone)]
pub struct PayloadCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for PayloadCodec {
    // The keyed state must never reach a log line.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec").finish_non_exhaustive()
    }
}

impl PayloadCodec {
    /// Creates a codec keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::InvalidKey`] if the MAC rejects the key.
    pub fn new(secret: &[u8]) -> Result<Self, PayloadError> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| PayloadError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Returns the lowercase hex HMAC-SHA256 of `identity`.
    pub fn sign(&self, identity: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(identity.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Builds the string written to a tag: `identity:signature`.
    pub fn encode(&self, identity: &str) -> String {
        format!("{identity}{SEPARATOR}{}", self.sign(identity))
    }

    /// Checks a payload read from a tag and returns the identity it carries.
    ///
    /// The payload is split at the *first* separator.  The comparison of the
    /// stored and recomputed signatures runs in constant time.
    ///
    /// # Errors
    ///
    /// - [`PayloadError::MissingSeparator`] if there is no `:`.
    /// - [`PayloadError::SignatureMismatch`] if the signature is wrong.
    pub fn verify<'a>(&self, payload: &'a str) -> Result<&'a str, PayloadError> {
        let (identity, signature) = payload
            .split_once(SEPARATOR)
            .ok_or(PayloadError::MissingSeparator)?;

        let expected = self.sign(identity);
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(identity)
        } else {
            Err(PayloadError::SignatureMismatch)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
