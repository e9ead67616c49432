//! Outbound request headers
//!
//! [`RequestSigner`] turns a body and an optional target into the full
//! `Epistula-*` header set. Targeted requests also carry the rotating secret
//! signatures and forward the body's top-level generation parameters as
//! headers, except for the keys that must only ever live in the body.

use crate::codec::{self, UnverifiedRequest};
use crate::identity::{Identity, SigningIdentity};
use crate::secret::{self, SECRET_SIGNATURE_COUNT};
use crate::time::now_millis;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Protocol version sent in `Epistula-Version`.
pub const PROTOCOL_VERSION: &str = "2";

/// `Epistula-Version`
pub const HEADER_VERSION: &str = "Epistula-Version";
/// `Epistula-Timestamp`
pub const HEADER_TIMESTAMP: &str = "Epistula-Timestamp";
/// `Epistula-Uuid`
pub const HEADER_UUID: &str = "Epistula-Uuid";
/// `Epistula-Signed-By`
pub const HEADER_SIGNED_BY: &str = "Epistula-Signed-By";
/// `Epistula-Signed-For`
pub const HEADER_SIGNED_FOR: &str = "Epistula-Signed-For";
/// `Epistula-Request-Signature`
pub const HEADER_REQUEST_SIGNATURE: &str = "Epistula-Request-Signature";
/// `Epistula-Secret-Signature-{0,1,2}`
pub const HEADER_SECRET_SIGNATURES: [&str; SECRET_SIGNATURE_COUNT] = [
    "Epistula-Secret-Signature-0",
    "Epistula-Secret-Signature-1",
    "Epistula-Secret-Signature-2",
];

/// Body keys that are never copied into headers.
pub const RESERVED_BODY_KEYS: [&str; 3] = ["messages", "model", "stream"];

const PROTOCOL_HEADER_PREFIX: &str = "epistula-";

/// Errors raised while building request headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    /// A targeted request body must be a JSON object.
    #[error("Invalid body: {message}")]
    InvalidBody {
        /// Why the body was rejected
        message: String,
    },
}

/// Complete header set for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    /// Protocol version
    pub version: String,
    /// Sender clock in milliseconds
    pub timestamp_ms: u64,
    /// Per-request id
    pub uuid: String,
    /// Sender identity
    pub signed_by: Identity,
    /// Target identity, when the request is addressed to one peer
    pub signed_for: Option<Identity>,
    /// Signature over the canonical message
    pub request_signature: String,
    /// Bucketed secret signatures, present only when `signed_for` is set
    pub secret_signatures: Option<[String; SECRET_SIGNATURE_COUNT]>,
    /// Body parameters mirrored into headers
    pub forwarded: BTreeMap<String, String>,
}

impl RequestHeaders {
    /// Flatten into `(name, value)` pairs, protocol headers first.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (HEADER_VERSION.to_string(), self.version.clone()),
            (HEADER_TIMESTAMP.to_string(), self.timestamp_ms.to_string()),
            (HEADER_UUID.to_string(), self.uuid.clone()),
            (HEADER_SIGNED_BY.to_string(), self.signed_by.to_string()),
            (
                HEADER_REQUEST_SIGNATURE.to_string(),
                self.request_signature.clone(),
            ),
        ];
        if let Some(target) = &self.signed_for {
            pairs.push((HEADER_SIGNED_FOR.to_string(), target.to_string()));
        }
        if let Some(secrets) = &self.secret_signatures {
            for (name, sig) in HEADER_SECRET_SIGNATURES.iter().zip(secrets) {
                pairs.push(((*name).to_string(), sig.clone()));
            }
        }
        pairs.extend(self.forwarded.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// Header values pulled out of a received request, ready for verification.
#[derive(Debug, Clone, Default)]
pub struct ReceivedHeaders {
    signature: String,
    timestamp: String,
    uuid: String,
    signed_by: String,
    signed_for: String,
    secret_signatures: Vec<String>,
}

impl ReceivedHeaders {
    /// Collect the `Epistula-*` values from header pairs, case-insensitively.
    /// Missing headers become empty strings and fail verification.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut received = Self::default();
        let mut secrets: [Option<String>; SECRET_SIGNATURE_COUNT] = Default::default();
        for (name, value) in pairs {
            let value = value.to_string();
            if name.eq_ignore_ascii_case(HEADER_REQUEST_SIGNATURE) {
                received.signature = value;
            } else if name.eq_ignore_ascii_case(HEADER_TIMESTAMP) {
                received.timestamp = value;
            } else if name.eq_ignore_ascii_case(HEADER_UUID) {
                received.uuid = value;
            } else if name.eq_ignore_ascii_case(HEADER_SIGNED_BY) {
                received.signed_by = value;
            } else if name.eq_ignore_ascii_case(HEADER_SIGNED_FOR) {
                received.signed_for = value;
            } else if let Some(idx) = HEADER_SECRET_SIGNATURES
                .iter()
                .position(|h| name.eq_ignore_ascii_case(h))
            {
                secrets[idx] = Some(value);
            }
        }
        received.secret_signatures = secrets.into_iter().flatten().collect();
        received
    }

    /// Borrow as an [`UnverifiedRequest`] over `body`.
    pub fn with_body<'a>(&'a self, body: &'a [u8]) -> UnverifiedRequest<'a> {
        UnverifiedRequest {
            signature: &self.signature,
            body,
            timestamp: &self.timestamp,
            uuid: &self.uuid,
            signed_by: &self.signed_by,
            signed_for: &self.signed_for,
        }
    }

    /// Secret signatures in header order.
    pub fn secret_signatures(&self) -> &[String] {
        &self.secret_signatures
    }

    /// Raw `Epistula-Signed-For` value.
    pub fn signed_for(&self) -> &str {
        &self.signed_for
    }

    /// Raw `Epistula-Signed-By` value.
    pub fn signed_by(&self) -> &str {
        &self.signed_by
    }
}

/// Builds signed header sets for one local identity.
#[derive(Debug, Clone, Copy)]
pub struct RequestSigner<'a> {
    identity: &'a SigningIdentity,
}

impl<'a> RequestSigner<'a> {
    /// Signer for `identity`.
    pub fn new(identity: &'a SigningIdentity) -> Self {
        Self { identity }
    }

    /// Build headers using the local clock and a fresh request id.
    pub fn build(
        &self,
        body: &[u8],
        signed_for: Option<&Identity>,
    ) -> Result<RequestHeaders, SignError> {
        self.build_at(body, signed_for, now_millis(), Uuid::new_v4().to_string())
    }

    /// Build headers for an explicit timestamp and request id.
    pub fn build_at(
        &self,
        body: &[u8],
        signed_for: Option<&Identity>,
        timestamp_ms: u64,
        uuid: String,
    ) -> Result<RequestHeaders, SignError> {
        let request_signature = codec::sign(self.identity, body, &uuid, timestamp_ms, signed_for);

        let (secret_signatures, forwarded) = match signed_for {
            Some(target) => (
                Some(secret::derive_secret_signatures(
                    self.identity,
                    timestamp_ms,
                    target,
                )),
                forwarded_parameters(body)?,
            ),
            None => (None, BTreeMap::new()),
        };

        Ok(RequestHeaders {
            version: PROTOCOL_VERSION.to_string(),
            timestamp_ms,
            uuid,
            signed_by: self.identity.identity(),
            signed_for: signed_for.copied(),
            request_signature,
            secret_signatures,
            forwarded,
        })
    }
}

/// Top-level body fields to mirror into headers.
fn forwarded_parameters(body: &[u8]) -> Result<BTreeMap<String, String>, SignError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| SignError::InvalidBody {
            message: e.to_string(),
        })?;
    let serde_json::Value::Object(fields) = value else {
        return Err(SignError::InvalidBody {
            message: "expected a JSON object".to_string(),
        });
    };

    let mut forwarded = BTreeMap::new();
    for (key, value) in fields {
        if RESERVED_BODY_KEYS.contains(&key.as_str()) {
            continue;
        }
        if key.to_ascii_lowercase().starts_with(PROTOCOL_HEADER_PREFIX) {
            tracing::debug!(key = %key, "not forwarding body key that shadows a protocol header");
            continue;
        }
        let rendered = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        forwarded.insert(key, rendered);
    }
    Ok(forwarded)
}
