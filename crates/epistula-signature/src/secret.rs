//! Rotating secret signatures
//!
//! Targeted requests carry three extra signatures over short time buckets so
//! the receiver can check a bounded-lifetime shared context without a session
//! handshake. Buckets are 10 s wide; the sender signs the bucket its clock
//! falls in plus both neighbours, giving roughly ±10 s of skew tolerance.

use crate::identity::{parse_signature, Identity, SigningIdentity};

/// Width of a secret bucket.
pub const BUCKET_WIDTH_MS: u64 = 10_000;

/// Number of secret signatures attached to a targeted request.
pub const SECRET_SIGNATURE_COUNT: usize = 3;

/// Bucket containing `timestamp_ms`, rounded up to the next boundary.
pub fn interval(timestamp_ms: u64) -> u64 {
    timestamp_ms.div_ceil(BUCKET_WIDTH_MS) * BUCKET_WIDTH_MS
}

/// The previous, current and next bucket for `timestamp_ms`.
pub fn buckets(timestamp_ms: u64) -> [u64; SECRET_SIGNATURE_COUNT] {
    let t = interval(timestamp_ms);
    [t.saturating_sub(BUCKET_WIDTH_MS), t, t + BUCKET_WIDTH_MS]
}

/// Message signed for one bucket.
pub fn secret_message(bucket: u64, signed_for: &Identity) -> String {
    format!("{bucket}.{signed_for}")
}

/// Sign every bucket around `timestamp_ms` for `signed_for`.
pub fn derive_secret_signatures(
    identity: &SigningIdentity,
    timestamp_ms: u64,
    signed_for: &Identity,
) -> [String; SECRET_SIGNATURE_COUNT] {
    buckets(timestamp_ms)
        .map(|bucket| identity.sign_hex(secret_message(bucket, signed_for).as_bytes()))
}

/// Receiver-side check: does any signature cover the receiver's own bucket?
pub fn verify_secret_signatures<S: AsRef<str>>(
    signatures: &[S],
    signed_by: &Identity,
    signed_for: &Identity,
    now_ms: u64,
) -> bool {
    let message = secret_message(interval(now_ms), signed_for);
    signatures
        .iter()
        .filter_map(|sig| parse_signature(sig.as_ref()))
        .any(|sig| signed_by.verify(message.as_bytes(), &sig))
}
