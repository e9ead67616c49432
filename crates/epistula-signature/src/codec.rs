//! Request signature codec
//!
//! Every outbound request is signed over a canonical message built from the
//! body digest and the replay-protection fields:
//!
//! ```text
//! sha256(body).hex "." uuid "." timestamp_ms "." signed_for
//! ```
//!
//! `signed_for` is the empty string for untargeted requests. Verification
//! rebuilds this string from the untrusted header values, so changing any one
//! of them invalidates the signature.
//!
//! Only stale timestamps are rejected. A sender whose clock runs ahead is
//! accepted; receivers that need an upper bound must add it themselves.

use crate::identity::{parse_signature, Identity, SigningIdentity};
use sha2::{Digest, Sha256};

/// How far in the past a request timestamp may lie before it is stale.
pub const ALLOWED_DELTA_MS: u64 = 8_000;

/// Reasons a signed request fails verification.
///
/// The `Display` strings are part of the protocol surface and are returned to
/// peers verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Signature is not a 64-byte hex value.
    #[error("Invalid Signature")]
    InvalidSignature,

    /// Timestamp is not a decimal millisecond count.
    #[error("Invalid Timestamp")]
    InvalidTimestamp,

    /// `signed_by` is not a valid public identity.
    #[error("Invalid Sender key")]
    InvalidSender,

    /// `signed_for` is set but not a valid public identity.
    #[error("Invalid receiver key")]
    InvalidReceiver,

    /// The request id is missing.
    #[error("Invalid uuid")]
    InvalidUuid,

    /// Timestamp is older than the replay window.
    #[error("Request is too stale")]
    Stale,

    /// Signature does not match the reconstructed message.
    #[error("Signature Mismatch")]
    SignatureMismatch,
}

/// Raw, unverified request fields as received from the wire.
#[derive(Debug, Clone, Copy)]
pub struct UnverifiedRequest<'a> {
    /// `Epistula-Request-Signature`
    pub signature: &'a str,
    /// Request body bytes
    pub body: &'a [u8],
    /// `Epistula-Timestamp`
    pub timestamp: &'a str,
    /// `Epistula-Uuid`
    pub uuid: &'a str,
    /// `Epistula-Signed-By`
    pub signed_by: &'a str,
    /// `Epistula-Signed-For`, empty when untargeted
    pub signed_for: &'a str,
}

/// Hex SHA-256 digest of a request body.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Build the canonical signed message.
pub fn signed_message(body: &[u8], uuid: &str, timestamp_ms: u64, signed_for: &str) -> String {
    format!("{}.{uuid}.{timestamp_ms}.{signed_for}", body_digest(body))
}

/// Sign a request body, returning the `0x`-prefixed hex signature.
pub fn sign(
    identity: &SigningIdentity,
    body: &[u8],
    uuid: &str,
    timestamp_ms: u64,
    signed_for: Option<&Identity>,
) -> String {
    let signed_for = signed_for.map(Identity::to_string).unwrap_or_default();
    let message = signed_message(body, uuid, timestamp_ms, &signed_for);
    identity.sign_hex(message.as_bytes())
}

/// Verify a signed request against the local clock reading `now_ms`.
pub fn verify(request: &UnverifiedRequest<'_>, now_ms: u64) -> Result<(), VerifyError> {
    let signature = parse_signature(request.signature).ok_or(VerifyError::InvalidSignature)?;
    let timestamp: u64 = request
        .timestamp
        .trim()
        .parse()
        .map_err(|_| VerifyError::InvalidTimestamp)?;
    let signed_by: Identity = request
        .signed_by
        .parse()
        .map_err(|_| VerifyError::InvalidSender)?;
    if !request.signed_for.is_empty() {
        request
            .signed_for
            .parse::<Identity>()
            .map_err(|_| VerifyError::InvalidReceiver)?;
    }
    if request.uuid.is_empty() {
        return Err(VerifyError::InvalidUuid);
    }

    if timestamp.saturating_add(ALLOWED_DELTA_MS) < now_ms {
        return Err(VerifyError::Stale);
    }

    let message = signed_message(request.body, request.uuid, timestamp, request.signed_for);
    if !signed_by.verify(message.as_bytes(), &signature) {
        return Err(VerifyError::SignatureMismatch);
    }
    Ok(())
}
