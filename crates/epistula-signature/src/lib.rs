//! Epistula request signing
//!
//! Pure building blocks for the authenticated request protocol spoken between a
//! validator and its miners:
//!
//! - [`identity`]: Ed25519 signing identities and their wire encoding
//! - [`codec`]: canonical message construction, signing and verification with
//!   a fixed replay window
//! - [`secret`]: 10 s bucketed secret signatures tolerant of clock skew
//! - [`headers`]: assembly of the full `Epistula-*` header set
//!
//! Nothing in this crate performs I/O. Signing is a pure function of the
//! identity and the message, so a single [`SigningIdentity`] can be shared
//! across concurrent tasks without locking.

pub mod codec;
pub mod headers;
pub mod identity;
pub mod secret;
pub mod time;

pub use codec::{sign, verify, UnverifiedRequest, VerifyError, ALLOWED_DELTA_MS};
pub use headers::{ReceivedHeaders, RequestHeaders, RequestSigner, SignError};
pub use identity::{Identity, IdentityError, SigningIdentity};
pub use secret::{buckets, derive_secret_signatures, verify_secret_signatures};
pub use time::now_millis;
