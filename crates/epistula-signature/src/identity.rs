//! Signing identities
//!
//! An Epistula identity is an Ed25519 keypair. The public half travels on the
//! wire as the lowercase hex encoding of the 32-byte verifying key, which is
//! what `Epistula-Signed-By` and `Epistula-Signed-For` carry.
//!
//! ## Security
//!
//! The signing key is secret material and should be:
//! - Loaded once at process start and shared read-only
//! - Never logged (the `Debug` impl redacts it)

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Length of an encoded Ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Errors raised while parsing identity material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The input was not valid hex.
    #[error("Invalid hex encoding: {message}")]
    InvalidHex {
        /// Decoder error
        message: String,
    },

    /// The decoded key had the wrong length.
    #[error("Invalid key length: expected 32 bytes, got {actual}")]
    InvalidLength {
        /// Number of bytes decoded
        actual: usize,
    },

    /// The bytes do not describe a valid Ed25519 point.
    #[error("Invalid public key: {message}")]
    InvalidPoint {
        /// Curve error
        message: String,
    },
}

/// Decode hex with an optional `0x` prefix.
pub(crate) fn decode_hex(input: &str) -> Result<Vec<u8>, IdentityError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(trimmed).map_err(|e| IdentityError::InvalidHex {
        message: e.to_string(),
    })
}

fn decode_key_bytes(input: &str) -> Result<[u8; 32], IdentityError> {
    let bytes = decode_hex(input)?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| IdentityError::InvalidLength {
        actual: bytes.len(),
    })
}

/// Public identity of a signer or target.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    key: VerifyingKey,
}

impl Identity {
    /// Wrap an existing verifying key.
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Raw verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.key.verify(message, signature).is_ok()
    }
}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.as_bytes().hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.key.as_bytes()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_key_bytes(s)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| IdentityError::InvalidPoint {
            message: e.to_string(),
        })?;
        Ok(Self { key })
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}

/// Private signing identity of the local node.
pub struct SigningIdentity {
    key: SigningKey,
}

impl SigningIdentity {
    /// Generate a fresh identity from the OS random source.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            key: SigningKey::generate(&mut rng),
        }
    }

    /// Build an identity from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build an identity from a hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed: &str) -> Result<Self, IdentityError> {
        decode_key_bytes(seed.trim()).map(Self::from_seed)
    }

    /// Hex-encoded seed, for writing key files.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Public identity matching this key.
    pub fn identity(&self) -> Identity {
        Identity::from_verifying_key(self.key.verifying_key())
    }

    /// Sign `message` and return the raw signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }

    /// Sign `message` and return the `0x`-prefixed hex form used on the wire.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        format!("0x{}", hex::encode(self.sign(message).to_bytes()))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't expose signing key in debug output
        f.debug_struct("SigningIdentity")
            .field("signing_key", &"[REDACTED]")
            .field("identity", &self.identity().to_string())
            .finish()
    }
}

/// Parse a `0x`-prefixed (or bare) hex signature.
pub fn parse_signature(input: &str) -> Option<Signature> {
    let bytes = decode_hex(input).ok()?;
    let bytes = <[u8; SIGNATURE_LENGTH]>::try_from(bytes.as_slice()).ok()?;
    Some(Signature::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roundtrip_through_string() {
        let signer = SigningIdentity::from_seed([7u8; 32]);
        let identity = signer.identity();
        let encoded = identity.to_string();

        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded.parse::<Identity>().unwrap(), identity);
        assert_eq!(format!("0x{encoded}").parse::<Identity>().unwrap(), identity);
    }

    #[test]
    fn test_identity_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<Identity>(),
            Err(IdentityError::InvalidHex { .. })
        ));
        assert!(matches!(
            "abcd".parse::<Identity>(),
            Err(IdentityError::InvalidLength { actual: 2 })
        ));
    }

    #[test]
    fn test_seed_hex_recreates_same_identity() {
        let signer = SigningIdentity::generate();
        let restored = SigningIdentity::from_seed_hex(&signer.seed_hex()).unwrap();
        assert_eq!(signer.identity(), restored.identity());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = SigningIdentity::from_seed([1u8; 32]);
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&signer.seed_hex()));
    }

    #[test]
    fn test_sign_hex_parses_back() {
        let signer = SigningIdentity::from_seed([3u8; 32]);
        let sig_hex = signer.sign_hex(b"hello");
        assert!(sig_hex.starts_with("0x"));

        let parsed = parse_signature(&sig_hex).unwrap();
        assert!(signer.identity().verify(b"hello", &parsed));
        assert!(!signer.identity().verify(b"hullo", &parsed));
    }

    #[test]
    fn test_identity_serde_as_string() {
        let identity = SigningIdentity::from_seed([9u8; 32]).identity();
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, format!("\"{identity}\""));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }
}
