//! Dispatch errors
//!
//! These cover setup problems only: invalid configuration, HTTP client
//! construction, and target resolution. Failures of an individual call never
//! surface as a `DispatchError`; they become a terminal result for that target.

use serde::{Deserialize, Serialize};

/// Error type for dispatch setup
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum DispatchError {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Which setting was rejected and why
        message: String,
    },

    /// A uid could not be mapped to a network address
    #[error("Resolution failed: {message}")]
    Resolution {
        /// Error message describing the missing target
        message: String,
    },

    /// The HTTP client could not be built
    #[error("Client error: {message}")]
    Client {
        /// Error message from the HTTP stack
        message: String,
    },
}

impl DispatchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Create a client error
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::client(err.to_string())
    }
}

/// Standard Result type for dispatch setup
pub type Result<T> = std::result::Result<T, DispatchError>;
